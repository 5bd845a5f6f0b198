// src/condition/downstream.rs

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::badge::Badge;
use crate::condition::{Condition, EvaluationContext};
use crate::host::{BuildInfo, Host};
use crate::types::{BuildRef, BuildResult};

/// Met when every listed downstream project has a passing build that was
/// caused, directly or through intermediate projects, by the build being
/// evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamPassCondition {
    pub jobs: Vec<String>,
    pub even_if_unstable: bool,
}

impl DownstreamPassCondition {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.jobs.is_empty() {
            return Err("at least one downstream job is required".to_string());
        }
        if self.jobs.iter().any(|j| j.trim().is_empty()) {
            return Err("downstream job names must not be empty".to_string());
        }
        Ok(())
    }
}

impl Condition for DownstreamPassCondition {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Badge> {
        let origin = &ctx.build.reference;
        let threshold = BuildResult::pass_threshold(self.even_if_unstable);
        let graph = TriggerGraph::discover(ctx.host, &origin.job);
        let reached = graph.caused_builds(ctx.host, origin);

        let mut passing = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            let job = job.trim();
            if !graph.reaches(job) {
                debug!(build = %origin, downstream = %job, "no trigger path to downstream job");
                return None;
            }
            let Some(best) = reached
                .iter()
                .find(|b| b.reference.job == job && b.passed(threshold))
            else {
                debug!(build = %origin, downstream = %job, "no passing downstream build yet");
                return None;
            };
            passing.push(best.reference.clone());
        }

        Some(Badge::DownstreamPass { builds: passing })
    }

    fn describe(&self) -> String {
        format!("downstream builds of {} pass", self.jobs.join(", "))
    }
}

/// Projects reachable from one job through the host's trigger edges.
#[derive(Debug)]
pub struct TriggerGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    root: NodeIndex,
}

impl TriggerGraph {
    /// Walk the host's trigger edges breadth-first from `root`.
    pub fn discover(host: &dyn Host, root: &str) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let root_idx = graph.add_node(root.to_string());
        index.insert(root.to_string(), root_idx);

        let mut queue = VecDeque::from([root.to_string()]);
        while let Some(job) = queue.pop_front() {
            let from = index[&job];
            for next in host.downstream_projects(&job) {
                let to = match index.get(&next) {
                    Some(&idx) => idx,
                    None => {
                        let idx = graph.add_node(next.clone());
                        index.insert(next.clone(), idx);
                        queue.push_back(next);
                        idx
                    }
                };
                graph.update_edge(from, to, ());
            }
        }

        Self {
            graph,
            index,
            root: root_idx,
        }
    }

    /// Whether `job` is reachable from the root. The root itself only
    /// counts as reachable through a cycle.
    pub fn reaches(&self, job: &str) -> bool {
        let Some(&goal) = self.index.get(job) else {
            return false;
        };
        if goal != self.root {
            return has_path_connecting(&self.graph, self.root, goal, None);
        }
        self.graph
            .neighbors(self.root)
            .any(|n| has_path_connecting(&self.graph, n, goal, None))
    }

    /// Every build caused by `origin`, following all trigger edges out of
    /// each reached build's job. Each build is visited once, so diamonds
    /// and cycles in the graph are walked without repeats.
    pub fn caused_builds(&self, host: &dyn Host, origin: &BuildRef) -> Vec<BuildInfo> {
        let mut seen = HashSet::from([origin.clone()]);
        let mut queue = VecDeque::from([origin.clone()]);
        let mut reached = Vec::new();

        while let Some(build) = queue.pop_front() {
            let Some(&node) = self.index.get(&build.job) else {
                continue;
            };
            for next in self.graph.neighbors(node) {
                for caused in host.builds_caused_by(&build, &self.graph[next]) {
                    if seen.insert(caused.reference.clone()) {
                        queue.push_back(caused.reference.clone());
                        reached.push(caused);
                    }
                }
            }
        }
        reached
    }
}
