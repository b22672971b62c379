//! Debug rendering of the taint flows observed during a scan as a `.dot`
//! graph.
//!
//! Storage nodes are labeled `function::symbol`; source nodes are labeled
//! with the source function's name. An edge records host data arriving at a
//! symbol (solid) or taint carried onward by an assignment or macro capture
//! (dashed). Meant for eyeballing why a particular finding fired, not for
//! machine consumption.

use crate::containers::InsertionOrderedSet;

/// What one edge in the graph represents.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FlowKind {
    /// Host data entering at a source call site.
    Source,
    /// Taint carried onward by an assignment or a macro capture.
    Propagation,
}

/// All taint flows observed while scanning one unit.
#[derive(Default)]
pub struct TaintGraph {
    nodes: InsertionOrderedSet<String>,
    edges: Vec<(usize, usize, FlowKind)>,
}

impl TaintGraph {
    pub fn new() -> Self {
        Default::default()
    }

    /// Record one flow from `from` to `to`. Repeats of an already recorded
    /// edge are dropped.
    pub fn record_flow(&mut self, from: String, to: String, kind: FlowKind) {
        let from = self.nodes.insert(from);
        let to = self.nodes.insert(to);
        let edge = (from, to, kind);
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Write a `.dot` representation of the graph.
    pub fn write_dot(&self, w: &mut impl std::io::Write) -> std::io::Result<()> {
        type Node = usize;
        type Edge = (usize, usize, FlowKind);

        struct Graph<'a> {
            graph: &'a TaintGraph,
        }

        impl<'a> dot::Labeller<'a, Node, Edge> for Graph<'a> {
            fn graph_id(&'a self) -> dot::Id<'a> {
                dot::Id::new("TaintFlows").unwrap()
            }
            fn node_id(&'a self, n: &Node) -> dot::Id<'a> {
                dot::Id::new(format!("n{}", n)).unwrap()
            }
            fn node_label<'b>(&'b self, n: &Node) -> dot::LabelText<'b> {
                match self.graph.nodes.get(*n) {
                    Some(label) => dot::LabelText::label(label.clone()),
                    None => unreachable!(),
                }
            }
            fn edge_style(&'a self, e: &Edge) -> dot::Style {
                match e.2 {
                    FlowKind::Source => dot::Style::Solid,
                    FlowKind::Propagation => dot::Style::Dashed,
                }
            }
            fn edge_label<'b>(&'b self, e: &Edge) -> dot::LabelText<'b> {
                dot::LabelText::label(match e.2 {
                    FlowKind::Source => "reads",
                    FlowKind::Propagation => "flows_to",
                })
            }
        }

        impl<'a> dot::GraphWalk<'a, Node, Edge> for Graph<'a> {
            fn nodes(&self) -> dot::Nodes<'a, Node> {
                (0..self.graph.nodes.iter().count()).collect::<Vec<_>>().into()
            }
            fn edges(&'a self) -> dot::Edges<'a, Edge> {
                self.graph.edges.clone().into()
            }
            fn source(&self, e: &Edge) -> Node {
                e.0
            }
            fn target(&self, e: &Edge) -> Node {
                e.1
            }
        }

        dot::render(&Graph { graph: self }, w)
    }

    /// Generate a `.dot` file representing the observed taint flows
    pub fn generate_dot(&self) -> String {
        let mut s: Vec<u8> = vec![];
        self.write_dot(&mut s).unwrap();
        String::from_utf8(s).unwrap()
    }
}
