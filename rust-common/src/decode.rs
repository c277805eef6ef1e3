use std::collections::BTreeSet;

use flowsched_core::{ActorKind, Assignment, ChannelId, SchedError, Schedule, ScheduleSink};

use crate::context::SchedulingContext;
use crate::session::{ChannelRole, GlobalRole, ModelSession, VarKey};

/// Pushes every firing and FIFO size of a satisfying assignment into `sink`.
///
/// DMA tasks are reported like any other actor, bound to the DMA engine that runs them.
/// FIFO sizes are only known when a buffer encoding was part of the model; self-loops always
/// report their initial tokens.
pub fn emit_schedule(
    ctx: &SchedulingContext,
    session: &ModelSession,
    assignment: &Assignment,
    sink: &mut dyn ScheduleSink,
) -> Result<(), SchedError> {
    for (_, inst) in ctx.hsdf.instances.iter() {
        let start = session.value(assignment, &VarKey::start(inst))?;
        let cpu = session.value(assignment, &VarKey::processor(inst))?;
        let resource = ctx
            .resource_name(ctx.window(inst.actor), cpu)
            .map_err(|e| match e {
                SchedError::MissingResource {
                    cluster, resource, ..
                } => SchedError::MissingResource {
                    cluster,
                    resource,
                    actor: ctx.graph.actor(inst.actor).name.clone(),
                },
                other => other,
            })?;
        sink.add_actor(&ctx.graph.actor(inst.actor).name, inst.rep, &resource, start);
    }
    for group in &ctx.buffer_groups {
        let channel: ChannelId = ctx.graph.get_channel(&group.name)?;
        let key = VarKey::Channel(ChannelRole::FifoSize, channel, 0);
        if session.try_var(&key).is_some() {
            sink.add_buffer_size(&group.name, session.value(assignment, &key)?.max(0) as u64);
        }
    }
    for (name, tokens) in &ctx.self_loops {
        sink.add_buffer_size(name, *tokens);
    }
    Ok(())
}

/// Number of distinct processors running compute instances.
pub fn processors_used(
    ctx: &SchedulingContext,
    session: &ModelSession,
    assignment: &Assignment,
) -> Result<usize, SchedError> {
    let mut used = BTreeSet::new();
    for (_, inst) in ctx.hsdf.instances.iter() {
        if ctx.window(inst.actor).kind == ActorKind::Compute {
            used.insert(session.value(assignment, &VarKey::processor(inst))?);
        }
    }
    Ok(used.len())
}

/// The schedule of a satisfying assignment, with every objective the model defines.
pub fn decode_schedule(
    ctx: &SchedulingContext,
    session: &ModelSession,
    assignment: &Assignment,
) -> Result<Schedule, SchedError> {
    let mut schedule = Schedule::default();
    emit_schedule(ctx, session, assignment, &mut schedule)?;
    let objective = |role: GlobalRole| -> Result<Option<i64>, SchedError> {
        let key = VarKey::global(role);
        match session.try_var(&key) {
            Some(_) => session.value(assignment, &key).map(Some),
            None => Ok(None),
        }
    };
    schedule.latency = objective(GlobalRole::Latency)?;
    schedule.period = objective(GlobalRole::Period)?;
    schedule.processor_count = match objective(GlobalRole::ProcessorCount)? {
        Some(n) => Some(n),
        None => Some(processors_used(ctx, session, assignment)? as i64),
    };
    schedule.total_buffer = objective(GlobalRole::TotalBuffer)?;
    Ok(schedule)
}
