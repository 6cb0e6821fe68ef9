mod common;

use common::{flush_all, recorder, submitted_batches};
use dashi_sync::gpu::null::NullBackend;
use dashi_sync::sync::{Barrier, Subresource};
use dashi_sync::{
    calc_subresource, BindFlags, BufferDesc, ContextConfig, ContractViolation, ResourceState,
    StateTransition, SubresourceExtent, SubresourceRange, TrackedResource, Usage,
};

#[test]
fn transition_to_contained_state_emits_nothing() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let tex = device.create_texture(
        "gbuffer",
        SubresourceExtent::new(3, 2),
        ResourceState::SHADER_RESOURCE | ResourceState::COPY_SOURCE,
    );

    ctx.transition_resource(&tex, ResourceState::SHADER_RESOURCE)
        .unwrap();
    ctx.transition_resource(&tex, ResourceState::COPY_SOURCE)
        .unwrap();

    assert_eq!(ctx.pending_barriers(), 0);
    assert!(flush_all(&mut ctx).is_empty());
}

#[test]
fn read_only_states_merge() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let tex = device.create_texture(
        "albedo",
        SubresourceExtent::new(1, 1),
        ResourceState::SHADER_RESOURCE,
    );

    ctx.transition_resource(&tex, ResourceState::COPY_SOURCE)
        .unwrap();

    let merged = ResourceState::SHADER_RESOURCE | ResourceState::COPY_SOURCE;
    assert_eq!(tex.state(), merged);
    assert_eq!(
        flush_all(&mut ctx),
        vec![Barrier::Transition {
            resource: tex.handle(),
            kind: tex.kind(),
            subresource: Subresource::All,
            before: ResourceState::SHADER_RESOURCE,
            after: merged,
        }]
    );
}

#[test]
fn write_state_replaces_read_state() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let tex = device.create_texture(
        "shadow",
        SubresourceExtent::new(1, 1),
        ResourceState::SHADER_RESOURCE | ResourceState::COPY_SOURCE,
    );

    ctx.transition_resource(&tex, ResourceState::DEPTH_WRITE)
        .unwrap();
    assert_eq!(tex.state(), ResourceState::DEPTH_WRITE);
}

#[test]
fn full_extent_range_collapses_to_one_barrier() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let tex = device.create_texture(
        "array",
        SubresourceExtent::new(4, 3),
        ResourceState::COPY_DEST,
    );

    ctx.transition_resources(&[
        StateTransition::<NullBackend>::new(&tex, ResourceState::SHADER_RESOURCE)
            .with_range(SubresourceRange::new(0, 4, 0, 3)),
    ])
    .unwrap();

    let barriers = flush_all(&mut ctx);
    assert_eq!(barriers.len(), 1);
    assert!(matches!(
        barriers[0],
        Barrier::Transition {
            subresource: Subresource::All,
            ..
        }
    ));
}

#[test]
fn partial_range_splits_per_subresource() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let extent = SubresourceExtent::new(4, 3);
    let tex = device.create_texture("array", extent, ResourceState::COPY_DEST);

    ctx.transition_resources(&[
        StateTransition::<NullBackend>::new(&tex, ResourceState::SHADER_RESOURCE)
            .with_range(SubresourceRange::new(1, 2, 1, 2)),
    ])
    .unwrap();

    let indices: Vec<u32> = flush_all(&mut ctx)
        .into_iter()
        .map(|b| match b {
            Barrier::Transition {
                subresource: Subresource::Index(i),
                before,
                after,
                ..
            } => {
                assert_eq!(before, ResourceState::COPY_DEST);
                assert_eq!(after, ResourceState::SHADER_RESOURCE);
                i
            }
            other => panic!("unexpected barrier {other:?}"),
        })
        .collect();

    let expected: Vec<u32> = [(1, 1), (1, 2), (2, 1), (2, 2)]
        .iter()
        .map(|&(mip, slice)| calc_subresource(mip, slice, 0, extent))
        .collect();
    assert_eq!(indices, expected);
    assert_eq!(indices, vec![5, 9, 6, 10]);
}

#[test]
fn remaining_sentinels_resolve_against_extent() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let tex = device.create_texture(
        "mips",
        SubresourceExtent::new(5, 1),
        ResourceState::COPY_DEST,
    );

    ctx.transition_resources(&[
        StateTransition::<NullBackend>::new(&tex, ResourceState::SHADER_RESOURCE).with_range(
            SubresourceRange::new(2, SubresourceRange::REMAINING_MIP_LEVELS, 0, 1),
        ),
    ])
    .unwrap();

    assert_eq!(flush_all(&mut ctx).len(), 3);
}

#[test]
fn batch_flushes_when_capacity_is_reached() {
    let (mut device, mut ctx) = recorder(ContextConfig {
        max_pending_barriers: 4,
        ..ContextConfig::default()
    });
    let textures: Vec<_> = (0..5)
        .map(|i| {
            device.create_texture(
                &format!("tex{i}"),
                SubresourceExtent::new(1, 1),
                ResourceState::COPY_DEST,
            )
        })
        .collect();

    for tex in &textures[..3] {
        ctx.transition_resource(tex, ResourceState::SHADER_RESOURCE)
            .unwrap();
    }
    assert_eq!(ctx.pending_barriers(), 3);
    assert!(submitted_batches(&ctx).is_empty());

    ctx.transition_resource(&textures[3], ResourceState::SHADER_RESOURCE)
        .unwrap();
    assert_eq!(ctx.pending_barriers(), 0);
    assert_eq!(
        submitted_batches(&ctx)
            .iter()
            .map(Vec::len)
            .collect::<Vec<_>>(),
        vec![4]
    );

    ctx.transition_resource(&textures[4], ResourceState::SHADER_RESOURCE)
        .unwrap();
    assert_eq!(ctx.pending_barriers(), 1);
}

#[test]
fn subresource_split_never_exceeds_capacity() {
    let (mut device, mut ctx) = recorder(ContextConfig {
        max_pending_barriers: 4,
        ..ContextConfig::default()
    });
    let tex = device.create_texture(
        "array",
        SubresourceExtent::new(3, 4),
        ResourceState::COPY_DEST,
    );

    ctx.transition_resources(&[
        StateTransition::<NullBackend>::new(&tex, ResourceState::SHADER_RESOURCE)
            .with_range(SubresourceRange::new(0, 3, 1, 2)),
    ])
    .unwrap();

    assert_eq!(
        submitted_batches(&ctx)
            .iter()
            .map(Vec::len)
            .collect::<Vec<_>>(),
        vec![4]
    );
    assert_eq!(ctx.pending_barriers(), 2);
}

#[test]
fn uav_to_uav_emits_only_a_hazard_barrier() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let tex = device.create_texture(
        "particles",
        SubresourceExtent::new(1, 1),
        ResourceState::UNORDERED_ACCESS,
    );

    ctx.transition_resource(&tex, ResourceState::UNORDERED_ACCESS)
        .unwrap();

    assert_eq!(
        flush_all(&mut ctx),
        vec![Barrier::UnorderedAccess {
            resource: tex.handle()
        }]
    );
    assert_eq!(tex.state(), ResourceState::UNORDERED_ACCESS);
}

#[test]
fn explicit_uav_barrier_is_batched() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let buf = device.create_buffer(
        "counters",
        BufferDesc {
            usage: Usage::Default,
            bind_flags: BindFlags::UNORDERED_ACCESS,
        },
        ResourceState::UNORDERED_ACCESS,
    );

    ctx.insert_uav_barrier(&buf).unwrap();
    assert_eq!(ctx.pending_barriers(), 1);
    assert!(flush_all(&mut ctx)[0].is_unordered_access());
}

#[test]
fn alias_barrier_flushes_on_request() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let a = device.create_texture("a", SubresourceExtent::new(1, 1), ResourceState::COPY_DEST);
    let b = device.create_texture("b", SubresourceExtent::new(1, 1), ResourceState::COPY_DEST);

    ctx.insert_alias_barrier(Some(&a), Some(&b), false).unwrap();
    assert_eq!(ctx.pending_barriers(), 1);

    ctx.insert_alias_barrier(None, Some(&a), true).unwrap();
    assert_eq!(ctx.pending_barriers(), 0);
    assert_eq!(
        submitted_batches(&ctx),
        vec![vec![
            Barrier::Aliasing {
                before: Some(a.handle()),
                after: Some(b.handle()),
            },
            Barrier::Aliasing {
                before: None,
                after: Some(a.handle()),
            },
        ]]
    );
}

#[test]
fn dynamic_upload_buffer_stays_in_generic_read() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let cb = device.create_buffer(
        "per-frame",
        BufferDesc {
            usage: Usage::Dynamic,
            bind_flags: BindFlags::UNIFORM_BUFFER,
        },
        ResourceState::GENERIC_READ,
    );

    for state in [
        ResourceState::CONSTANT_BUFFER,
        ResourceState::UNORDERED_ACCESS,
        ResourceState::VERTEX_BUFFER | ResourceState::INDEX_BUFFER,
        ResourceState::RENDER_TARGET,
        ResourceState::COPY_DEST,
    ] {
        let res = ctx.transition_resource(&cb, state);
        if ResourceState::GENERIC_READ.contains(state) {
            res.unwrap();
        } else {
            assert!(matches!(
                res.unwrap_err().as_violation(),
                Some(ContractViolation::DynamicBufferState { .. })
            ));
        }
        assert!(ResourceState::GENERIC_READ.contains(cb.state()));
    }
    assert_eq!(ctx.pending_barriers(), 0);
}

#[test]
fn dynamic_buffer_with_srv_may_leave_generic_read() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let buf = device.create_buffer(
        "structured",
        BufferDesc {
            usage: Usage::Dynamic,
            bind_flags: BindFlags::SHADER_RESOURCE,
        },
        ResourceState::GENERIC_READ,
    );

    ctx.transition_resource(&buf, ResourceState::COPY_DEST)
        .unwrap();
    assert_eq!(buf.state(), ResourceState::COPY_DEST);
}

#[test]
fn dynamic_upload_buffer_cannot_drop_out_of_tracking() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let upload_only = BufferDesc {
        usage: Usage::Dynamic,
        bind_flags: BindFlags::VERTEX_BUFFER,
    };
    let vb = device.create_buffer("streaming-vb", upload_only, ResourceState::UNKNOWN);

    let err = ctx
        .transition_resources(&[
            StateTransition::<NullBackend>::new(&vb, ResourceState::VERTEX_BUFFER)
                .with_old_state(ResourceState::COPY_DEST)
                .untracked(),
        ])
        .unwrap_err();
    assert!(matches!(
        err.as_violation(),
        Some(ContractViolation::DynamicBufferState { tracked: false, .. })
    ));
    assert_eq!(vb.state(), ResourceState::UNKNOWN);
    assert_eq!(ctx.pending_barriers(), 0);

    // Handing the buffer back to the engine from a readable state is fine.
    ctx.transition_resources(&[
        StateTransition::<NullBackend>::new(&vb, ResourceState::VERTEX_BUFFER)
            .with_old_state(ResourceState::COPY_SOURCE),
    ])
    .unwrap();
    assert_eq!(
        vb.state(),
        ResourceState::VERTEX_BUFFER | ResourceState::COPY_SOURCE
    );
}

#[test]
fn dynamic_upload_buffer_found_outside_generic_read_is_reported() {
    let (mut device, mut ctx) = recorder(ContextConfig::default());
    let cb = device.create_buffer(
        "per-draw",
        BufferDesc {
            usage: Usage::Dynamic,
            bind_flags: BindFlags::UNIFORM_BUFFER,
        },
        ResourceState::COPY_DEST,
    );

    let err = ctx
        .transition_resource(&cb, ResourceState::CONSTANT_BUFFER)
        .unwrap_err();
    assert_eq!(
        err.as_violation(),
        Some(&ContractViolation::DynamicBufferState {
            resource: "per-draw".into(),
            current: ResourceState::COPY_DEST,
            requested: ResourceState::CONSTANT_BUFFER,
            tracked: true,
        })
    );
    assert_eq!(cb.state(), ResourceState::COPY_DEST);
    assert_eq!(ctx.pending_barriers(), 0);
}
