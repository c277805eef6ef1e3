use std::collections::{BTreeMap, BTreeSet, HashMap};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Receiver of a decoded schedule.
pub trait ScheduleSink {
    fn add_actor(&mut self, actor_name: &str, instance_index: u32, resource: &str, start_time: i64);

    fn add_buffer_size(&mut self, channel_name: &str, size_in_tokens: u64);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ScheduledFiring {
    pub actor: String,
    pub instance: u32,
    pub resource: String,
    pub start_time: i64,
}

/// A concrete schedule: start time and resource of every actor instance, plus the achieved
/// objectives of the assignment it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Schedule {
    pub firings: Vec<ScheduledFiring>,
    pub buffer_sizes: BTreeMap<String, u64>,
    pub latency: Option<i64>,
    pub period: Option<i64>,
    pub processor_count: Option<i64>,
    pub total_buffer: Option<i64>,
}

impl ScheduleSink for Schedule {
    fn add_actor(&mut self, actor_name: &str, instance_index: u32, resource: &str, start_time: i64) {
        self.firings.push(ScheduledFiring {
            actor: actor_name.to_string(),
            instance: instance_index,
            resource: resource.to_string(),
            start_time,
        });
    }

    fn add_buffer_size(&mut self, channel_name: &str, size_in_tokens: u64) {
        self.buffer_sizes
            .insert(channel_name.to_string(), size_in_tokens);
    }
}

impl Schedule {
    pub fn firing(&self, actor: &str, instance: u32) -> Option<&ScheduledFiring> {
        self.firings
            .iter()
            .find(|f| f.actor == actor && f.instance == instance)
    }

    pub fn resources_used(&self) -> BTreeSet<&str> {
        self.firings.iter().map(|f| f.resource.as_str()).collect()
    }

    /// Achieved objectives, keyed the way exploration results are compared.
    pub fn objectives(&self) -> HashMap<String, f64> {
        let mut objs = HashMap::new();
        if let Some(l) = self.latency {
            objs.insert("latency".to_string(), l as f64);
        }
        if let Some(p) = self.period {
            objs.insert("period".to_string(), p as f64);
        }
        if let Some(n) = self.processor_count {
            objs.insert("processors".to_string(), n as f64);
        }
        if let Some(b) = self.total_buffer {
            objs.insert("buffer".to_string(), b as f64);
        }
        objs
    }
}
