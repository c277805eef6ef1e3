use derive_builder::Builder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum Regime {
    /// One iteration scheduled in isolation.
    #[default]
    NonPipelined,
    /// Steady-state periodic schedule where iterations overlap.
    Pipelined,
}

/// How absolute times are folded into one period in the pipelined regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum PeriodicFolding {
    /// `K = Start div Period`, `Start' = Start - K·Period`.
    #[default]
    Modulo,
    /// Bounded K selected by case analysis, and a wrap flag per instance.
    TypeSplit,
    /// Bounded K, limited by the distance of the instance from a source.
    Omega,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum BufferEncoding {
    CaseSplit,
    IndexedFunction,
}

impl BufferEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            BufferEncoding::CaseSplit => "case-split",
            BufferEncoding::IndexedFunction => "indexed-function",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum Objective {
    #[default]
    Latency,
    Period,
    ProcessorCount,
    TotalBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum ProcessorBudget {
    /// Every processor of the platform may be used.
    #[default]
    Platform,
    /// At most this many processors per cluster.
    Fixed(u32),
    /// The number of processors per cluster is a decision variable.
    Free,
}

/// Options of one model build.
///
/// Every field has a default, so a builder only needs the options that differ:
///
/// ```
/// use flowsched_common::config::{Regime, SchedulingConfigBuilder};
/// let config = SchedulingConfigBuilder::default()
///     .regime(Regime::Pipelined)
///     .build()
///     .unwrap();
/// assert!(config.task_symmetry);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Builder)]
#[builder(default)]
#[serde(default)]
pub struct SchedulingConfig {
    pub regime: Regime,
    pub folding: PeriodicFolding,
    pub objective: Objective,
    pub processors: ProcessorBudget,
    pub task_symmetry: bool,
    pub processor_symmetry: bool,
    /// Skip mutual exclusion between instances ordered by precedence.
    pub graph_analysis: bool,
    pub buffer_analysis: Option<BufferEncoding>,
    /// Issue the DMA transfers of one firing in output port order.
    pub dma_ordering: bool,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        SchedulingConfig {
            regime: Regime::NonPipelined,
            folding: PeriodicFolding::Modulo,
            objective: Objective::Latency,
            processors: ProcessorBudget::Platform,
            task_symmetry: true,
            processor_symmetry: true,
            graph_analysis: true,
            buffer_analysis: None,
            dma_ordering: true,
        }
    }
}

impl SchedulingConfig {
    pub fn is_pipelined(&self) -> bool {
        self.regime == Regime::Pipelined
    }
}
