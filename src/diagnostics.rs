use std::collections::HashMap;
use std::fmt::Write;
use std::time::{Duration, Instant};

use crate::Workspace;
use crate::core::NodeId;
use crate::kind::Kind;

/// A single computation carried out by the engine.
#[derive(Debug, Clone)]
pub struct Execution {
    pub node: NodeId,
    pub kind: Kind,
    pub start: Instant,
    pub duration: Duration,
}

/// Resolution diagnostics and performance metrics.
///
/// Returned by [`Workspace::diagnostics`]. Every entry in `executions` is one
/// call into a producer or one routing pass of a project; cache hits are only
/// counted.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    pub executions: Vec<Execution>,
    pub hits: usize,
}

impl Diagnostics {
    /// How many times `node` was computed.
    pub fn count(&self, node: NodeId) -> usize {
        self.executions.iter().filter(|e| e.node == node).count()
    }

    pub fn total(&self) -> usize {
        self.executions.len()
    }

    /// Total time spent in `node` over all its computations.
    pub fn time(&self, node: NodeId) -> Duration {
        self.executions
            .iter()
            .filter(|e| e.node == node)
            .map(|e| e.duration)
            .sum()
    }

    /// Renders the graph as a Mermaid diagram, color-coded by the total
    /// time spent in each node.
    ///
    /// * **Green**: Fast
    /// * **Yellow**: Moderate
    /// * **Red**: Slow
    /// * **Blue**: Never computed
    pub fn render_mermaid(&self, workspace: &Workspace) -> String {
        let mut totals: HashMap<NodeId, Duration> = HashMap::new();
        for exec in &self.executions {
            *totals.entry(exec.node).or_default() += exec.duration;
        }

        let max = totals
            .values()
            .map(Duration::as_secs_f64)
            .fold(0.0_f64, f64::max)
            .max(f64::EPSILON);

        let shared = &workspace.shared;
        let mut f = String::new();
        writeln!(f, "graph LR").unwrap();

        for index in shared.graph.node_indices() {
            let node = NodeId(index);
            let name = shared.graph[index].name().replace('"', "\\\"");

            let (label, color) = match totals.get(&node) {
                Some(duration) => {
                    let t = duration.as_secs_f64() / max;
                    let (r, g) = if t < 0.5 {
                        ((255.0 * t * 2.0) as u8, 255)
                    } else {
                        (255, (255.0 * (1.0 - (t - 0.5) * 2.0)) as u8)
                    };
                    (format!("{duration:.2?}"), format!("#{r:02X}{g:02X}00"))
                }
                None => ("not computed".to_string(), "#ADD8E6".to_string()),
            };

            writeln!(f, "    {}[\"{}\\n{}\"]", index.index(), name, label).unwrap();
            writeln!(f, "    style {} fill:{}", index.index(), color).unwrap();
        }

        for edge in shared.graph.edge_indices() {
            let (source, target) = shared.graph.edge_endpoints(edge).unwrap();
            writeln!(
                f,
                "    {} -- \"{}\" --> {}",
                source.index(),
                shared.graph[edge],
                target.index()
            )
            .unwrap();
        }

        f
    }
}
