pub mod errors;
pub mod graph;
pub mod instance;
#[macro_use]
pub mod macros;
pub mod platform;
pub mod repetition;
pub mod schedule;
pub mod solver;
pub mod term;

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;

pub use errors::{SchedError, SolverError};
pub use graph::{Actor, ActorId, ActorKind, Channel, ChannelId, Port, PortDirection, SdfGraph};
pub use instance::{ActorInstanceId, InstanceIdx, InstanceTable};
pub use platform::{Cluster, ClusterId, DmaEngine, Platform, Processor, SchedulingConstraints};
pub use repetition::RepetitionSolution;
pub use schedule::{Schedule, ScheduleSink, ScheduledFiring};
pub use solver::{Assignment, AssertionStack, Literal, SatResult, Solver, SolverFactory};
pub use term::{ConstraintSystem, Sort, Term, VarDecl, VarId};

/// A serialisable model exchanged between the stages of the flow: scheduling problems going
/// in, schedules coming out.
///
/// Every decision model can render itself as JSON, MessagePack and CBOR so that results can
/// be consumed by tools written in other languages. The `part` of a model lists the names of
/// the application and platform elements it covers.
pub trait DecisionModel: Send + Sync {
    fn category(&self) -> String;

    fn part(&self) -> HashSet<String>;

    fn body_as_json(&self) -> Option<String> {
        None
    }

    fn body_as_msgpack(&self) -> Option<Vec<u8>> {
        None
    }

    fn body_as_cbor(&self) -> Option<Vec<u8>> {
        None
    }

    /// Writes every available body under `base_path` and returns the written paths.
    fn write_to_dir(
        &self,
        base_path: &Path,
        prefix_str: &str,
        suffix_str: &str,
    ) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(base_path)?;
        let category = self.category();
        let mut written = vec![];
        if let Some(j) = self.body_as_json() {
            let p = base_path.join(format!("body_{}_{}_{}.json", prefix_str, category, suffix_str));
            std::fs::write(&p, j)?;
            written.push(p);
        }
        if let Some(b) = self.body_as_msgpack() {
            let p = base_path.join(format!(
                "body_{}_{}_{}.msgpack",
                prefix_str, category, suffix_str
            ));
            std::fs::write(&p, b)?;
            written.push(p);
        }
        if let Some(b) = self.body_as_cbor() {
            let p = base_path.join(format!("body_{}_{}_{}.cbor", prefix_str, category, suffix_str));
            std::fs::write(&p, b)?;
            written.push(p);
        }
        Ok(written)
    }
}

impl DecisionModel for Schedule {
    impl_decision_model_standard_parts!(Schedule);

    fn part(&self) -> HashSet<String> {
        let mut elems: HashSet<String> = HashSet::new();
        elems.extend(self.firings.iter().map(|f| f.actor.to_owned()));
        elems.extend(self.firings.iter().map(|f| f.resource.to_owned()));
        elems.extend(self.buffer_sizes.keys().map(|x| x.to_owned()));
        elems
    }
}

/// Reads a decision model from a `.json`, `.msgpack` or `.cbor` file.
pub fn load_decision_model<T: DecisionModel + DeserializeOwned>(path: &Path) -> Option<T> {
    if let Ok(f) = std::fs::File::open(path) {
        if let Some(ext) = path.extension() {
            if ext.eq_ignore_ascii_case("cbor") {
                return ciborium::from_reader(f).ok();
            } else if ext.eq_ignore_ascii_case("msgpack") {
                return rmp_serde::from_read(f).ok();
            } else if ext.eq_ignore_ascii_case("json") {
                return serde_json::from_reader(f).ok();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedules_round_trip_through_every_format() {
        let mut s = Schedule::default();
        s.add_actor("A", 0, "pe0", 0);
        s.add_buffer_size("ab", 2);
        s.latency = Some(7);
        let dir = std::env::temp_dir().join("flowsched-core-test");
        let written = s.write_to_dir(&dir, "t", "schedule").unwrap();
        assert_eq!(written.len(), 3);
        for p in &written {
            let back: Schedule = load_decision_model(p).unwrap();
            assert_eq!(back, s);
        }
        assert!(s.part().contains("pe0"));
    }
}
