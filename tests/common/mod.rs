#![allow(dead_code)]

use dashi_sync::gpu::null::{NullBackend, NullCommand, NullDevice, NullResource};
use dashi_sync::sync::Barrier;
use dashi_sync::utils::Handle;
use dashi_sync::{CommandContext, ContextConfig};

/// Route `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Headless device plus a context recording on it.
pub fn recorder(config: ContextConfig) -> (NullDevice, CommandContext<NullBackend>) {
    init_logging();
    let mut device = NullDevice::new();
    let ctx = CommandContext::new("test", &mut device, &config).expect("create context");
    (device, ctx)
}

/// Every barrier batch the context has submitted so far, flattened per batch.
pub fn submitted_batches(
    ctx: &CommandContext<NullBackend>,
) -> Vec<Vec<Barrier<Handle<NullResource>>>> {
    ctx.command_list()
        .barrier_batches()
        .map(|batch| batch.to_vec())
        .collect()
}

/// Flush the context and return everything it submitted, in order.
pub fn flush_all(ctx: &mut CommandContext<NullBackend>) -> Vec<Barrier<Handle<NullResource>>> {
    ctx.flush_resource_barriers();
    submitted_batches(ctx).into_iter().flatten().collect()
}

pub fn non_barrier_commands(ctx: &CommandContext<NullBackend>) -> Vec<NullCommand> {
    ctx.command_list()
        .commands()
        .iter()
        .filter(|c| !matches!(c, NullCommand::Barriers(_)))
        .cloned()
        .collect()
}
