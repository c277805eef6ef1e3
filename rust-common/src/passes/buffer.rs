use flowsched_core::{repetition::gcd, ActorInstanceId, ChannelId, SchedError, Term};

use crate::config::BufferEncoding;
use crate::context::{BufferGroup, SchedulingContext};
use crate::passes::ConstraintPass;
use crate::session::{ChannelRole, GlobalRole, ModelSession, VarKey};

/// Smallest FIFO capacity any schedule of a channel needs: `nA + nB - g + (d mod g)` with
/// `g = gcd(nA, nB)`.
pub fn static_buffer_bound(production: u64, consumption: u64, initial_tokens: u64) -> u64 {
    let g = gcd(production, consumption).max(1);
    production + consumption - g + initial_tokens % g
}

/// Peak occupancy of every FIFO and their total size.
///
/// Tokens are counted from the start of the producing firing until the end of the consuming
/// one, over the timeline of one iteration. A channel split by DMA gets an occupancy per side
/// and one FIFO size covering both.
#[derive(Debug)]
pub struct BufferPass {
    pub encoding: BufferEncoding,
}

struct Side {
    channel: ChannelId,
    production: i64,
    consumption: i64,
    initial_tokens: i64,
    producers: Vec<ActorInstanceId>,
    consumers: Vec<ActorInstanceId>,
}

impl Side {
    fn new(ctx: &SchedulingContext, channel: ChannelId) -> Side {
        let c = ctx.graph.channel(channel);
        Side {
            channel,
            production: c.production_rate() as i64,
            consumption: c.consumption_rate() as i64,
            initial_tokens: c.initial_tokens as i64,
            producers: ctx.hsdf.instances.of_actor(c.producer()).to_vec(),
            consumers: ctx.hsdf.instances.of_actor(c.consumer()).to_vec(),
        }
    }

    fn lower_bound(&self) -> i64 {
        static_buffer_bound(
            self.production as u64,
            self.consumption as u64,
            self.initial_tokens as u64,
        ) as i64
    }

    fn upper_bound(&self) -> i64 {
        self.initial_tokens + self.production * self.producers.len() as i64
    }

    fn key(&self, role: ChannelRole, index: usize) -> VarKey {
        VarKey::Channel(role, self.channel, index as u32)
    }
}

impl BufferPass {
    /// Occupancy right after each producer firing starts.
    fn case_split(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
        side: &Side,
    ) -> Result<Vec<Term>, SchedError> {
        let mut starts = Vec::with_capacity(side.producers.len());
        for p in &side.producers {
            starts.push(session.term(&VarKey::start(*p))?);
        }
        let mut ends = Vec::with_capacity(side.consumers.len());
        for c in &side.consumers {
            ends.push(session.term(&VarKey::end(*c))?);
        }
        let mut levels = Vec::with_capacity(starts.len());
        for (i, s_i) in starts.iter().enumerate() {
            let mut terms = vec![Term::int(side.initial_tokens + side.production)];
            for (j, s_j) in starts.iter().enumerate() {
                if i != j {
                    terms.push(Term::ite(
                        s_j.clone().le(s_i.clone()),
                        side.production,
                        0,
                    ));
                }
            }
            let consumed: Vec<Term> = ends
                .iter()
                .map(|e| Term::ite(e.clone().le(s_i.clone()), side.consumption, 0))
                .collect();
            let at = session.declare_int(
                &ctx.graph,
                side.key(ChannelRole::BufferAt, i),
                Some(0),
                Some(side.upper_bound()),
            )?;
            session.assert(Term::Var(at).equals(Term::sum(terms).minus(Term::sum(consumed))));
            levels.push(Term::Var(at));
        }
        Ok(levels)
    }

    /// Occupancy after each event of the channel, events being placed at distinct positions
    /// consistent with their times.
    fn indexed_function(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
        side: &Side,
    ) -> Result<Vec<Term>, SchedError> {
        // producers first; at equal times a release goes before a reservation
        let mut events: Vec<(Term, i64, bool)> = vec![];
        for p in &side.producers {
            events.push((session.term(&VarKey::start(*p))?, side.production, true));
        }
        for c in &side.consumers {
            events.push((session.term(&VarKey::end(*c))?, -side.consumption, false));
        }
        let n = events.len();
        let mut positions = Vec::with_capacity(n);
        for e in 0..n {
            let pos = session.declare_int(
                &ctx.graph,
                side.key(ChannelRole::EventPosition, e),
                Some(1),
                Some(n as i64),
            )?;
            positions.push(Term::Var(pos));
        }
        session.assert(Term::distinct(positions.clone()));
        for e in 0..n {
            for f in e + 1..n {
                let (t_e, t_f) = (events[e].0.clone(), events[f].0.clone());
                let before = if events[e].2 == events[f].2 {
                    t_e.le(t_f)
                } else {
                    t_e.lt(t_f)
                };
                session.assert(positions[e].clone().lt(positions[f].clone()).equals(before));
            }
        }
        let mut previous = Term::int(side.initial_tokens);
        let mut levels = Vec::with_capacity(n);
        for p in 1..=n {
            let delta: Vec<Term> = events
                .iter()
                .zip(&positions)
                .map(|((_, rate, _), pos)| Term::ite(pos.clone().equals(p as i64), *rate, 0))
                .collect();
            let level = session.declare_int(
                &ctx.graph,
                side.key(ChannelRole::BufferLevel, p),
                Some(-side.consumption * side.consumers.len() as i64),
                Some(side.upper_bound()),
            )?;
            session.assert(Term::Var(level).equals(previous.plus(Term::sum(delta))));
            previous = Term::Var(level);
            levels.push(previous.clone());
        }
        Ok(levels)
    }

    /// Peak occupancy of every side of `group` and the FIFO size covering them.
    ///
    /// The sides of a channel split by DMA are not forced to equal peaks: the FIFO size is the
    /// larger of them, so both halves get the same capacity while each peak stays exact.
    fn encode_group(
        &self,
        ctx: &SchedulingContext,
        session: &mut ModelSession,
        group: &BufferGroup,
    ) -> Result<(Term, i64, i64), SchedError> {
        let mut maxima = vec![];
        let (mut lower, mut upper) = (0, 0);
        for channel in &group.sides {
            let side = Side::new(ctx, *channel);
            let mut levels = match self.encoding {
                BufferEncoding::CaseSplit => self.case_split(ctx, session, &side)?,
                BufferEncoding::IndexedFunction => self.indexed_function(ctx, session, &side)?,
            };
            levels.push(Term::int(side.initial_tokens));
            let peak = session.declare_int(
                &ctx.graph,
                side.key(ChannelRole::MaxBuffer, 0),
                Some(side.lower_bound()),
                Some(side.upper_bound()),
            )?;
            session.assert(Term::Var(peak).equals(Term::max(levels)));
            session.assert(Term::Var(peak).ge(side.lower_bound()));
            maxima.push(Term::Var(peak));
            lower = lower.max(side.lower_bound());
            upper = upper.max(side.upper_bound());
        }
        let fifo_channel = ctx.graph.get_channel(&group.name)?;
        let fifo = session.declare_int(
            &ctx.graph,
            VarKey::Channel(ChannelRole::FifoSize, fifo_channel, 0),
            Some(lower),
            Some(upper),
        )?;
        session.assert(Term::Var(fifo).equals(Term::max(maxima)));
        Ok((Term::Var(fifo), lower, upper))
    }
}

impl ConstraintPass for BufferPass {
    fn name(&self) -> &'static str {
        "buffer"
    }

    fn apply(&self, ctx: &SchedulingContext, session: &mut ModelSession) -> Result<(), SchedError> {
        session.claim_buffer_encoding(self.encoding)?;
        let mut sizes = vec![];
        let (mut lower, mut upper) = (0, 0);
        for group in &ctx.buffer_groups {
            let (fifo, lo, hi) = self.encode_group(ctx, session, group)?;
            let token_size = group.token_size as i64;
            sizes.push(fifo.times(token_size));
            lower += lo * token_size;
            upper += hi * token_size;
        }
        let total = session.declare_int(
            &ctx.graph,
            VarKey::global(GlobalRole::TotalBuffer),
            Some(lower),
            Some(upper),
        )?;
        session.assert(Term::Var(total).equals(Term::sum(sizes)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_bound_follows_rates_and_tokens() {
        assert_eq!(static_buffer_bound(1, 1, 0), 1);
        assert_eq!(static_buffer_bound(2, 3, 0), 4);
        assert_eq!(static_buffer_bound(4, 6, 3), 9);
        assert_eq!(static_buffer_bound(4, 6, 4), 8);
    }
}
