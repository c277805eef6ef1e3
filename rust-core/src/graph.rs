use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::SchedError;

/// Dense index of an actor inside its [SdfGraph].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct ActorId(pub usize);

impl ActorId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Dense index of a channel inside its [SdfGraph].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct ChannelId(pub usize);

impl ChannelId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
pub enum ActorKind {
    /// Runs on a processor of its cluster.
    #[default]
    Compute,
    /// Runs on a DMA engine of its cluster.
    Communication,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Actor {
    pub name: String,
    pub execution_time: u64,
    #[serde(default)]
    pub kind: ActorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Port {
    pub name: String,
    pub actor: ActorId,
    pub direction: PortDirection,
    pub rate: u64,
}

fn default_token_size() -> u64 {
    1
}

/// A FIFO channel between one output port and one input port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Channel {
    pub name: String,
    pub source: Port,
    pub target: Port,
    #[serde(default = "default_token_size")]
    pub token_size: u64,
    #[serde(default)]
    pub initial_tokens: u64,
}

impl Channel {
    /// The port at the given end of the channel: `Output` is the producing side.
    pub fn link(&self, direction: PortDirection) -> &Port {
        match direction {
            PortDirection::Output => &self.source,
            PortDirection::Input => &self.target,
        }
    }

    pub fn producer(&self) -> ActorId {
        self.source.actor
    }

    pub fn consumer(&self) -> ActorId {
        self.target.actor
    }

    pub fn production_rate(&self) -> u64 {
        self.source.rate
    }

    pub fn consumption_rate(&self) -> u64 {
        self.target.rate
    }

    pub fn is_self_loop(&self) -> bool {
        self.source.actor == self.target.actor
    }
}

/// Synchronous dataflow graph: actors connected by channels with fixed integer rates.
///
/// Actors and channels are stored in arenas and addressed by [ActorId] and [ChannelId]. The
/// graph is immutable once an exploration session starts; the cluster extension builds a new
/// graph rather than editing the input one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SdfGraph {
    actors: Vec<Actor>,
    channels: Vec<Channel>,
}

impl SdfGraph {
    pub fn new() -> SdfGraph {
        SdfGraph::default()
    }

    pub fn add_actor(
        &mut self,
        name: &str,
        execution_time: u64,
        kind: ActorKind,
    ) -> Result<ActorId, SchedError> {
        if self.actors.iter().any(|a| a.name == name) {
            return Err(SchedError::DuplicateActor(name.to_string()));
        }
        self.actors.push(Actor {
            name: name.to_string(),
            execution_time,
            kind,
        });
        Ok(ActorId(self.actors.len() - 1))
    }

    /// Connects `source` to `target` with unit-sized tokens.
    pub fn add_channel(
        &mut self,
        name: &str,
        source: ActorId,
        production: u64,
        target: ActorId,
        consumption: u64,
        initial_tokens: u64,
    ) -> Result<ChannelId, SchedError> {
        if self.channels.iter().any(|c| c.name == name) {
            return Err(SchedError::DuplicateChannel(name.to_string()));
        }
        for a in [source, target] {
            if a.index() >= self.actors.len() {
                return Err(SchedError::UnknownActor(format!("#{}", a.index())));
            }
        }
        if production == 0 || consumption == 0 {
            return Err(SchedError::ZeroRate(name.to_string()));
        }
        self.channels.push(Channel {
            name: name.to_string(),
            source: Port {
                name: format!("{}_out", name),
                actor: source,
                direction: PortDirection::Output,
                rate: production,
            },
            target: Port {
                name: format!("{}_in", name),
                actor: target,
                direction: PortDirection::Input,
                rate: consumption,
            },
            token_size: 1,
            initial_tokens,
        });
        Ok(ChannelId(self.channels.len() - 1))
    }

    pub fn set_token_size(&mut self, channel: ChannelId, token_size: u64) -> Result<(), SchedError> {
        let c = self
            .channels
            .get_mut(channel.index())
            .ok_or_else(|| SchedError::UnknownChannel(format!("#{}", channel.index())))?;
        c.token_size = token_size;
        Ok(())
    }

    pub fn actors(&self) -> impl Iterator<Item = (ActorId, &Actor)> + '_ {
        self.actors.iter().enumerate().map(|(i, a)| (ActorId(i), a))
    }

    pub fn channels(&self) -> impl Iterator<Item = (ChannelId, &Channel)> + '_ {
        self.channels
            .iter()
            .enumerate()
            .map(|(i, c)| (ChannelId(i), c))
    }

    pub fn num_actors(&self) -> usize {
        self.actors.len()
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn actor(&self, id: ActorId) -> &Actor {
        &self.actors[id.index()]
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn get_actor(&self, name: &str) -> Result<ActorId, SchedError> {
        self.actors
            .iter()
            .position(|a| a.name == name)
            .map(ActorId)
            .ok_or_else(|| SchedError::UnknownActor(name.to_string()))
    }

    pub fn get_channel(&self, name: &str) -> Result<ChannelId, SchedError> {
        self.channels
            .iter()
            .position(|c| c.name == name)
            .map(ChannelId)
            .ok_or_else(|| SchedError::UnknownChannel(name.to_string()))
    }

    /// Channels produced by `actor`, in port declaration order.
    pub fn outgoing(&self, actor: ActorId) -> impl Iterator<Item = (ChannelId, &Channel)> + '_ {
        self.channels().filter(move |(_, c)| c.producer() == actor)
    }

    pub fn incoming(&self, actor: ActorId) -> impl Iterator<Item = (ChannelId, &Channel)> + '_ {
        self.channels().filter(move |(_, c)| c.consumer() == actor)
    }

    /// True when every rate is one, i.e. the graph is already homogeneous.
    pub fn is_homogeneous(&self) -> bool {
        self.channels
            .iter()
            .all(|c| c.production_rate() == 1 && c.consumption_rate() == 1)
    }

    /// Checks the invariants that deserialised graphs cannot guarantee by construction.
    pub fn validate(&self) -> Result<(), SchedError> {
        let mut names = HashSet::new();
        for a in &self.actors {
            if !names.insert(a.name.as_str()) {
                return Err(SchedError::DuplicateActor(a.name.clone()));
            }
        }
        let mut channel_names = HashSet::new();
        for c in &self.channels {
            if !channel_names.insert(c.name.as_str()) {
                return Err(SchedError::DuplicateChannel(c.name.clone()));
            }
            if c.production_rate() == 0 || c.consumption_rate() == 0 {
                return Err(SchedError::ZeroRate(c.name.clone()));
            }
            for p in [&c.source, &c.target] {
                if p.actor.index() >= self.actors.len() {
                    return Err(SchedError::UnknownActor(format!("#{}", p.actor.index())));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_fail_on_unknown_names() {
        let mut g = SdfGraph::new();
        let a = g.add_actor("A", 3, ActorKind::Compute).unwrap();
        assert_eq!(g.get_actor("A").unwrap(), a);
        assert_eq!(
            g.get_actor("Z"),
            Err(SchedError::UnknownActor("Z".to_string()))
        );
        assert!(g.get_channel("c").is_err());
    }

    #[test]
    fn duplicate_actor_is_rejected() {
        let mut g = SdfGraph::new();
        g.add_actor("A", 1, ActorKind::Compute).unwrap();
        assert_eq!(
            g.add_actor("A", 2, ActorKind::Compute),
            Err(SchedError::DuplicateActor("A".to_string()))
        );
    }

    #[test]
    fn link_selects_the_port_by_direction() {
        let mut g = SdfGraph::new();
        let a = g.add_actor("A", 1, ActorKind::Compute).unwrap();
        let b = g.add_actor("B", 1, ActorKind::Compute).unwrap();
        let c = g.add_channel("ab", a, 2, b, 3, 1).unwrap();
        let ch = g.channel(c);
        assert_eq!(ch.link(PortDirection::Output).actor, a);
        assert_eq!(ch.link(PortDirection::Input).rate, 3);
        assert!(!g.is_homogeneous());
        assert_eq!(g.add_channel("bad", a, 0, b, 1, 0), Err(SchedError::ZeroRate("bad".to_string())));
    }
}
