// Copyright 2025 the Gmem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests for tiled and bypass frame rendering.

use std::sync::Arc;

use gmem::{
    BufferMask, BypassReason, CacheOptions, ColorAttachment, DebugFlags, DepthStencilAttachment,
    DeviceCaps, Dispatcher, FrameDesc, LayoutCache, LayoutKey, Mode, NeverBypass, StencilLayout,
    Tile, TileCallbacks, TileGrid,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    PrepareTiling { binning: bool },
    PrepareTile(u32, u32),
    RestoreTile(u32, u32, BufferMask),
    RenderPrepTile(u32, u32),
    EmitTile(u32, u32),
    ResolveTile(u32, u32),
    FinishTiling,
    PrepareSysmem,
    EmitSysmem,
    FinishSysmem,
    Submit,
}

#[derive(Default)]
struct Recorder {
    calls: Vec<Call>,
    submits: u32,
}

impl Recorder {
    fn tiles(&self) -> Vec<(u32, u32)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::EmitTile(col, row) => Some((*col, *row)),
                _ => None,
            })
            .collect()
    }
}

impl TileCallbacks for Recorder {
    type Fence = u32;

    fn prepare_tiling(&mut self, _: &TileGrid, binning: bool) {
        self.calls.push(Call::PrepareTiling { binning });
    }

    fn prepare_tile(&mut self, _: &TileGrid, tile: &Tile) {
        self.calls.push(Call::PrepareTile(tile.col, tile.row));
    }

    fn restore_tile(&mut self, _: &TileGrid, tile: &Tile, mask: BufferMask) {
        self.calls.push(Call::RestoreTile(tile.col, tile.row, mask));
    }

    fn render_prep_tile(&mut self, _: &TileGrid, tile: &Tile) {
        self.calls.push(Call::RenderPrepTile(tile.col, tile.row));
    }

    fn emit_tile_commands(&mut self, _: &TileGrid, tile: &Tile) {
        self.calls.push(Call::EmitTile(tile.col, tile.row));
    }

    fn resolve_tile(&mut self, _: &TileGrid, tile: &Tile) {
        self.calls.push(Call::ResolveTile(tile.col, tile.row));
    }

    fn finish_tiling(&mut self, _: &TileGrid) {
        self.calls.push(Call::FinishTiling);
    }

    fn prepare_sysmem(&mut self, _: &FrameDesc) {
        self.calls.push(Call::PrepareSysmem);
    }

    fn emit_sysmem_commands(&mut self, _: &FrameDesc) {
        self.calls.push(Call::EmitSysmem);
    }

    fn finish_sysmem(&mut self, _: &FrameDesc) {
        self.calls.push(Call::FinishSysmem);
    }

    fn submit(&mut self) -> u32 {
        self.calls.push(Call::Submit);
        self.submits += 1;
        self.submits
    }
}

/// Room for exactly one 32x32 bin at 4 bytes per pixel.
fn small_caps() -> DeviceCaps {
    DeviceCaps {
        gmem_bytes: 32 * 32 * 4,
        tile_align_w: 32,
        tile_align_h: 32,
        page_align: gmem::PageAlignPolicy::Native,
        ..DeviceCaps::default()
    }
}

fn dispatcher(caps: DeviceCaps, debug: DebugFlags) -> Dispatcher {
    Dispatcher::new(Arc::new(LayoutCache::new(
        caps,
        CacheOptions {
            debug,
            ..CacheOptions::default()
        },
    )))
}

/// A 128x96 frame that clears its only color buffer and draws once.
fn frame() -> FrameDesc {
    FrameDesc {
        cleared: BufferMask::color(0),
        draw_count: 1,
        ..FrameDesc::new(128, 96)
    }
    .with_color(ColorAttachment::new(4))
}

const SYSMEM: [Call; 4] = [
    Call::PrepareSysmem,
    Call::EmitSysmem,
    Call::FinishSysmem,
    Call::Submit,
];

#[test]
fn tiled_frame_walks_tiles_in_serpentine_order() {
    let dispatcher = dispatcher(small_caps(), DebugFlags::none());
    let mut recorder = Recorder::default();
    let report = dispatcher
        .render(&frame(), &mut recorder, &NeverBypass)
        .unwrap();
    assert_eq!(report.mode, Mode::Tiled { bins: 12, pipes: 12 });
    assert_eq!(report.fence, 1);

    assert_eq!(
        recorder.tiles(),
        [
            (0, 0),
            (1, 0),
            (2, 0),
            (3, 0),
            (3, 1),
            (2, 1),
            (1, 1),
            (0, 1),
            (0, 2),
            (1, 2),
            (2, 2),
            (3, 2),
        ]
    );

    // Everything cleared: no restores, and every tile goes through the full protocol.
    assert_eq!(recorder.calls.first(), Some(&Call::PrepareTiling { binning: true }));
    assert_eq!(
        &recorder.calls[1..6],
        &[
            Call::PrepareTile(0, 0),
            Call::RenderPrepTile(0, 0),
            Call::EmitTile(0, 0),
            Call::ResolveTile(0, 0),
            Call::PrepareTile(1, 0),
        ]
    );
    assert_eq!(recorder.calls.len(), 1 + 12 * 4 + 2);
    assert_eq!(
        &recorder.calls[recorder.calls.len() - 2..],
        &[Call::FinishTiling, Call::Submit]
    );
}

#[test]
fn row_major_when_serpentine_is_disabled() {
    let dispatcher = dispatcher(small_caps(), DebugFlags::NO_SERPENTINE);
    let mut recorder = Recorder::default();
    dispatcher
        .render(&frame(), &mut recorder, &NeverBypass)
        .unwrap();
    let tiles = recorder.tiles();
    assert_eq!(tiles[4], (0, 1));
    assert!(tiles.windows(2).all(|w| (w[0].1, w[0].0) < (w[1].1, w[1].0)));
}

#[test]
fn uncleared_buffers_are_restored() {
    let dispatcher = dispatcher(small_caps(), DebugFlags::none());
    let frame = FrameDesc {
        cleared: BufferMask::none(),
        ..frame()
    };
    let mut recorder = Recorder::default();
    dispatcher.render(&frame, &mut recorder, &NeverBypass).unwrap();
    assert_eq!(
        &recorder.calls[1..4],
        &[
            Call::PrepareTile(0, 0),
            Call::RestoreTile(0, 0, BufferMask::color(0)),
            Call::RenderPrepTile(0, 0),
        ]
    );
}

#[test]
fn partial_depth_clear_restores_stencil_too() {
    let caps = DeviceCaps {
        gmem_bytes: 1 << 20,
        ..small_caps()
    };
    let dispatcher = dispatcher(caps, DebugFlags::none());
    let frame = FrameDesc {
        cleared: BufferMask::color(0) | BufferMask::STENCIL,
        depth_enabled: true,
        ..frame().with_depth_stencil(DepthStencilAttachment::new(4, StencilLayout::Combined))
    };
    let mut recorder = Recorder::default();
    dispatcher.render(&frame, &mut recorder, &NeverBypass).unwrap();
    let restores: Vec<_> = recorder
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::RestoreTile(_, _, mask) => Some(*mask),
            _ => None,
        })
        .collect();
    assert!(!restores.is_empty());
    assert!(restores.iter().all(|&mask| mask == BufferMask::DEPTH_STENCIL));
}

#[test]
fn single_bin_frames_skip_binning() {
    let caps = DeviceCaps {
        gmem_bytes: 1 << 20,
        ..small_caps()
    };
    let dispatcher = dispatcher(caps, DebugFlags::none());
    let mut recorder = Recorder::default();
    let report = dispatcher
        .render(&frame(), &mut recorder, &NeverBypass)
        .unwrap();
    assert_eq!(report.mode, Mode::Tiled { bins: 1, pipes: 1 });
    assert_eq!(
        recorder.calls.first(),
        Some(&Call::PrepareTiling { binning: false })
    );
}

#[test]
fn bypass_reasons() {
    let dispatcher = dispatcher(small_caps(), DebugFlags::none());
    let cases = [
        (
            FrameDesc {
                cleared: BufferMask::none(),
                draw_count: 0,
                ..frame()
            },
            BypassReason::Flush,
        ),
        (
            FrameDesc::new(128, 96).with_color(ColorAttachment {
                layers: 2,
                ..ColorAttachment::new(4)
            }),
            BypassReason::Flush,
        ),
        (
            FrameDesc {
                draw_count: 1,
                ..FrameDesc::new(128, 96).with_color(ColorAttachment {
                    layers: 2,
                    ..ColorAttachment::new(4)
                })
            },
            BypassReason::Layered,
        ),
        (
            FrameDesc {
                scissor: Some(gmem::Scissor {
                    min_x: 500,
                    min_y: 0,
                    max_x: 600,
                    max_y: 10,
                }),
                ..frame()
            },
            BypassReason::EmptyArea,
        ),
        (
            FrameDesc {
                has_tessellation: true,
                ..frame()
            },
            BypassReason::Tessellation,
        ),
        (
            FrameDesc {
                draw_count: 1,
                ..FrameDesc::new(128, 96)
            },
            BypassReason::NoAttachments,
        ),
        (
            FrameDesc {
                draw_count: 1,
                ..FrameDesc::new(128, 96)
                    .with_depth_stencil(DepthStencilAttachment::new(4, StencilLayout::Absent))
            },
            BypassReason::NoAttachments,
        ),
    ];
    for (frame, reason) in cases {
        let mut recorder = Recorder::default();
        let report = dispatcher.render(&frame, &mut recorder, &NeverBypass).unwrap();
        assert_eq!(report.mode, Mode::Bypass(reason), "{frame:?}");
        assert_eq!(recorder.calls, SYSMEM);
    }
}

#[test]
fn debug_flags_override_the_advisor() {
    let always = |_: &FrameDesc, _: &LayoutKey| true;

    let mut recorder = Recorder::default();
    let report = dispatcher(small_caps(), DebugFlags::none())
        .render(&frame(), &mut recorder, &always)
        .unwrap();
    assert_eq!(report.mode, Mode::Bypass(BypassReason::Advisor));

    let report = dispatcher(small_caps(), DebugFlags::FORCE_TILED)
        .render(&frame(), &mut recorder, &always)
        .unwrap();
    assert!(matches!(report.mode, Mode::Tiled { .. }));

    // Forcing tiling never overrides frames that can't be tiled.
    let layered = FrameDesc {
        draw_count: 1,
        ..FrameDesc::new(128, 96).with_color(ColorAttachment {
            layers: 4,
            ..ColorAttachment::new(4)
        })
    };
    let report = dispatcher(small_caps(), DebugFlags::FORCE_TILED)
        .render(&layered, &mut recorder, &NeverBypass)
        .unwrap();
    assert_eq!(report.mode, Mode::Bypass(BypassReason::Layered));

    let report = dispatcher(small_caps(), DebugFlags::FORCE_BYPASS)
        .render(&frame(), &mut recorder, &NeverBypass)
        .unwrap();
    assert_eq!(report.mode, Mode::Bypass(BypassReason::Forced));
    assert_eq!(recorder.submits, 4);
}

#[test]
fn dispatchers_of_a_cache_share_its_flags() {
    let cache = Arc::new(LayoutCache::new(
        small_caps(),
        CacheOptions {
            debug: DebugFlags::FORCE_TILED | DebugFlags::NO_SERPENTINE,
            ..CacheOptions::default()
        },
    ));
    let always = |_: &FrameDesc, _: &LayoutKey| true;
    for dispatcher in [Dispatcher::new(cache.clone()), Dispatcher::new(cache.clone())] {
        let mut recorder = Recorder::default();
        let report = dispatcher.render(&frame(), &mut recorder, &always).unwrap();
        assert!(matches!(report.mode, Mode::Tiled { .. }));
        let tiles = recorder.tiles();
        assert!(tiles.windows(2).all(|w| (w[0].1, w[0].0) < (w[1].1, w[1].0)));
    }
}

#[test]
fn infeasible_layout_falls_back_to_bypass() {
    let caps = DeviceCaps {
        gmem_bytes: 1024,
        ..small_caps()
    };
    let dispatcher = dispatcher(caps, DebugFlags::none());
    let mut recorder = Recorder::default();
    let report = dispatcher
        .render(&frame(), &mut recorder, &NeverBypass)
        .unwrap();
    assert_eq!(report.mode, Mode::Bypass(BypassReason::InfeasibleLayout));
    assert_eq!(recorder.calls, SYSMEM);
    assert!(dispatcher.cache().is_empty());
}

#[test]
fn zero_page_alignment_is_an_error() {
    let caps = DeviceCaps {
        page_align: gmem::PageAlignPolicy::Fixed(0),
        ..small_caps()
    };
    let dispatcher = dispatcher(caps, DebugFlags::none());
    let mut recorder = Recorder::default();
    let err = dispatcher
        .render(&frame(), &mut recorder, &NeverBypass)
        .unwrap_err();
    assert!(!err.is_infeasible());
    assert!(recorder.calls.is_empty());
}

#[test]
fn grids_are_released_after_rendering() {
    let dispatcher = dispatcher(small_caps(), DebugFlags::none());
    let mut recorder = Recorder::default();
    dispatcher
        .render(&frame(), &mut recorder, &NeverBypass)
        .unwrap();
    let entries = dispatcher.cache().entries();
    assert_eq!(entries.len(), 1);
    // One reference held by the cache, one by `entries`.
    assert_eq!(Arc::strong_count(&entries[0].1), 2);
}
