use std::collections::HashSet;

use flowsched_core::{
    impl_decision_model_standard_parts, DecisionModel, Platform, RepetitionSolution, SchedError,
    SchedulingConstraints, SdfGraph,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Decision model for scheduling one synchronous dataflow application on a clustered
/// multicore.
///
/// The application is an SDF graph whose actors carry execution times and whose channels
/// carry token sizes and initial tokens. The platform is a set of clusters, each with
/// processors sharing a local memory and DMA engines that move tokens between clusters.
/// `constraints` fixes the cluster of every actor; on a single cluster it can stay empty.
///
/// The repetition vector can be given, in which case it is checked against the balance
/// equations, or left out to be computed from the rates.
///
/// ## References
///
/// The unfolding follows S. Sriram and S. S. Bhattacharyya, "Embedded Multiprocessors:
/// Scheduling and Synchronization", 2nd ed., CRC Press, 2009. The constraint encoding of
/// non-pipelined and pipelined schedules, including inter-cluster DMA, follows
/// P. Tendulkar, "Mapping and Scheduling on Multi-core Processors using SMT Solvers",
/// PhD thesis, Université de Grenoble, 2014.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, JsonSchema)]
pub struct SdfSchedulingProblem {
    pub graph: SdfGraph,
    #[serde(default)]
    pub repetitions: Option<RepetitionSolution>,
    pub platform: Platform,
    #[serde(default)]
    pub constraints: SchedulingConstraints,
}

impl DecisionModel for SdfSchedulingProblem {
    impl_decision_model_standard_parts!(SdfSchedulingProblem);

    fn part(&self) -> HashSet<String> {
        let mut elems: HashSet<String> = HashSet::new();
        elems.extend(self.graph.actors().map(|(_, a)| a.name.to_owned()));
        elems.extend(self.graph.channels().map(|(_, c)| c.name.to_owned()));
        for c in &self.platform.clusters {
            elems.insert(c.name.to_owned());
            elems.extend(c.processors.iter().map(|p| p.name.to_owned()));
            elems.extend(c.dma_engines.iter().map(|d| d.name.to_owned()));
        }
        elems
    }
}

impl SdfSchedulingProblem {
    pub fn new(graph: SdfGraph, platform: Platform) -> SdfSchedulingProblem {
        SdfSchedulingProblem {
            graph,
            repetitions: None,
            platform,
            constraints: SchedulingConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: SchedulingConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// The given repetition vector once verified, or the computed one.
    pub fn repetitions(&self) -> Result<RepetitionSolution, SchedError> {
        match &self.repetitions {
            Some(q) => {
                q.verify(&self.graph)?;
                Ok(q.clone())
            }
            None => RepetitionSolution::compute(&self.graph),
        }
    }

    /// Sum over one iteration of the execution time of every firing.
    pub fn total_work(&self) -> Result<u64, SchedError> {
        let q = self.repetitions()?;
        Ok(self
            .graph
            .actors()
            .map(|(id, a)| a.execution_time * q.get(id))
            .sum())
    }
}
