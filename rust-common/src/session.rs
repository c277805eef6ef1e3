use std::collections::{HashMap, HashSet};

use flowsched_core::{
    ActorInstanceId, Assignment, ChannelId, ConstraintSystem, SchedError, SdfGraph, Term, VarId,
};

use crate::config::BufferEncoding;

/// Per-instance variable roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceRole {
    Start,
    End,
    Processor,
    /// End of the last DMA transfer issued by a compute instance.
    TrueEnd,
    KStart,
    KEnd,
    StartPrime,
    EndPrime,
    /// Whether the occupation of the instance wraps around the period boundary.
    Wrap,
    /// Running maximum of processor indices up to this instance.
    MaxProcessor,
}

impl InstanceRole {
    pub fn prefix(&self) -> &'static str {
        match self {
            InstanceRole::Start => "start_",
            InstanceRole::End => "end_",
            InstanceRole::Processor => "cpu_",
            InstanceRole::TrueEnd => "trueEnd_",
            InstanceRole::KStart => "kStart_",
            InstanceRole::KEnd => "kEnd_",
            InstanceRole::StartPrime => "startPrime_",
            InstanceRole::EndPrime => "endPrime_",
            InstanceRole::Wrap => "wrap_",
            InstanceRole::MaxProcessor => "maxCpu_",
        }
    }
}

/// Per-channel variable roles, indexed by producer firing, event or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelRole {
    BufferAt,
    MaxBuffer,
    EventPosition,
    BufferLevel,
    FifoSize,
}

impl ChannelRole {
    pub fn prefix(&self) -> &'static str {
        match self {
            ChannelRole::BufferAt => "bufAt_",
            ChannelRole::MaxBuffer => "maxBuf_",
            ChannelRole::EventPosition => "bufPos_",
            ChannelRole::BufferLevel => "bufLevel_",
            ChannelRole::FifoSize => "fifo_",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlobalRole {
    Latency,
    Period,
    ProcessorCount,
    KMax,
    TotalBuffer,
}

impl GlobalRole {
    pub fn name(&self) -> &'static str {
        match self {
            GlobalRole::Latency => "latency",
            GlobalRole::Period => "period",
            GlobalRole::ProcessorCount => "procCount",
            GlobalRole::KMax => "kMax",
            GlobalRole::TotalBuffer => "totalBuffer",
        }
    }
}

/// Identity of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarKey {
    Instance(InstanceRole, ActorInstanceId),
    Channel(ChannelRole, ChannelId, u32),
    Global(GlobalRole),
}

impl VarKey {
    pub fn start(i: ActorInstanceId) -> VarKey {
        VarKey::Instance(InstanceRole::Start, i)
    }

    pub fn end(i: ActorInstanceId) -> VarKey {
        VarKey::Instance(InstanceRole::End, i)
    }

    pub fn processor(i: ActorInstanceId) -> VarKey {
        VarKey::Instance(InstanceRole::Processor, i)
    }

    pub fn global(role: GlobalRole) -> VarKey {
        VarKey::Global(role)
    }

    /// Solver-visible name: `<prefix><actor or channel>_<index>`.
    ///
    /// Prefixes end with `_` and contain no other underscore, so names of distinct keys only
    /// collide when actor or channel names do.
    pub fn name(&self, graph: &SdfGraph) -> String {
        match self {
            VarKey::Instance(role, i) => format!(
                "{}{}_{}",
                role.prefix(),
                graph.actor(i.actor).name,
                i.rep
            ),
            VarKey::Channel(role, c, idx) => {
                format!("{}{}_{}", role.prefix(), graph.channel(*c).name, idx)
            }
            VarKey::Global(role) => role.name().to_string(),
        }
    }
}

/// Owner of every variable table of one model build.
///
/// A session maps typed keys to solver variables and refuses to declare the same key, or the
/// same solver name, twice. `reset` brings it back to an empty model.
#[derive(Debug, Clone, Default)]
pub struct ModelSession {
    system: ConstraintSystem,
    vars: HashMap<VarKey, VarId>,
    names: HashSet<String>,
    buffer_encoding: Option<BufferEncoding>,
}

impl ModelSession {
    pub fn new() -> ModelSession {
        ModelSession::default()
    }

    pub fn reset(&mut self) {
        self.system.clear();
        self.vars.clear();
        self.names.clear();
        self.buffer_encoding = None;
    }

    fn register(&mut self, key: VarKey, name: &str) -> Result<(), SchedError> {
        if self.vars.contains_key(&key) || self.names.contains(name) {
            return Err(SchedError::DuplicateVariable(name.to_string()));
        }
        self.names.insert(name.to_string());
        Ok(())
    }

    pub fn declare_int(
        &mut self,
        graph: &SdfGraph,
        key: VarKey,
        lower: Option<i64>,
        upper: Option<i64>,
    ) -> Result<VarId, SchedError> {
        let name = key.name(graph);
        self.register(key, &name)?;
        let v = self.system.declare_int(&name, lower, upper);
        self.vars.insert(key, v);
        Ok(v)
    }

    pub fn declare_bool(&mut self, graph: &SdfGraph, key: VarKey) -> Result<VarId, SchedError> {
        let name = key.name(graph);
        self.register(key, &name)?;
        let v = self.system.declare_bool(&name);
        self.vars.insert(key, v);
        Ok(v)
    }

    pub fn var(&self, key: &VarKey) -> Result<VarId, SchedError> {
        self.vars
            .get(key)
            .copied()
            .ok_or_else(|| SchedError::UndeclaredVariable(format!("{:?}", key)))
    }

    pub fn try_var(&self, key: &VarKey) -> Option<VarId> {
        self.vars.get(key).copied()
    }

    /// The variable of `key` as a term.
    pub fn term(&self, key: &VarKey) -> Result<Term, SchedError> {
        self.var(key).map(Term::Var)
    }

    pub fn assert(&mut self, t: Term) {
        self.system.assert(t);
    }

    /// Narrows the declared domain of an already declared variable.
    pub fn tighten(
        &mut self,
        key: &VarKey,
        lower: Option<i64>,
        upper: Option<i64>,
    ) -> Result<(), SchedError> {
        let v = self.var(key)?;
        self.system.tighten(v, lower, upper);
        Ok(())
    }

    pub fn system(&self) -> &ConstraintSystem {
        &self.system
    }

    pub fn num_vars(&self) -> usize {
        self.system.num_vars()
    }

    pub fn num_assertions(&self) -> usize {
        self.system.assertions().len()
    }

    /// Records the buffer encoding of this model; a second, different one is an error.
    pub fn claim_buffer_encoding(&mut self, encoding: BufferEncoding) -> Result<(), SchedError> {
        match self.buffer_encoding {
            Some(current) if current != encoding => Err(SchedError::MixedBufferEncodings(
                current.name().to_string(),
                encoding.name().to_string(),
            )),
            _ => {
                self.buffer_encoding = Some(encoding);
                Ok(())
            }
        }
    }

    pub fn value(&self, assignment: &Assignment, key: &VarKey) -> Result<i64, SchedError> {
        let v = self.var(key)?;
        assignment
            .value(v)
            .ok_or_else(|| SchedError::MissingValue(self.system.decl(v).name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsched_core::{ActorId, ActorKind};

    fn graph() -> SdfGraph {
        let mut g = SdfGraph::new();
        g.add_actor("A", 1, ActorKind::Compute).unwrap();
        g.add_actor("A_1", 1, ActorKind::Compute).unwrap();
        g
    }

    #[test]
    fn duplicate_keys_are_fatal() {
        let g = graph();
        let mut s = ModelSession::new();
        let key = VarKey::start(ActorInstanceId::new(ActorId(0), 0));
        s.declare_int(&g, key, Some(0), None).unwrap();
        assert_eq!(
            s.declare_int(&g, key, Some(0), None),
            Err(SchedError::DuplicateVariable("start_A_0".to_string()))
        );
        s.reset();
        assert!(s.declare_int(&g, key, Some(0), None).is_ok());
    }

    #[test]
    fn names_stay_distinct_for_underscored_actor_names() {
        let g = graph();
        let a = VarKey::start(ActorInstanceId::new(ActorId(0), 12));
        let b = VarKey::start(ActorInstanceId::new(ActorId(1), 2));
        assert_ne!(a.name(&g), b.name(&g));
        assert_eq!(VarKey::global(GlobalRole::Latency).name(&g), "latency");
    }

    #[test]
    fn buffer_encodings_cannot_be_mixed() {
        let mut s = ModelSession::new();
        s.claim_buffer_encoding(BufferEncoding::CaseSplit).unwrap();
        s.claim_buffer_encoding(BufferEncoding::CaseSplit).unwrap();
        assert!(matches!(
            s.claim_buffer_encoding(BufferEncoding::IndexedFunction),
            Err(SchedError::MixedBufferEncodings(_, _))
        ));
    }

    #[test]
    fn undeclared_lookups_fail() {
        let s = ModelSession::new();
        assert!(s.var(&VarKey::global(GlobalRole::Period)).is_err());
    }
}
