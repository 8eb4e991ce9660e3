use std::time::Duration;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use smithay::utils::{Logical, Point, Rectangle, Size};

use super::fixture::{Fixture, SharedSurface};
use crate::output::OutputId;
use crate::render_helpers::RenderTargetKind;
use crate::utils::region::Region;
use crate::window::{StaticSurface, WindowId};

fn arbitrary_rect() -> impl Strategy<Value = Rectangle<i32, Logical>> {
    (-300..4000i32, -300..1400i32, 1..1000i32, 1..800i32).prop_map(|(x, y, w, h)| {
        Rectangle::new(Point::from((x, y)), Size::from((w, h)))
    })
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    AddWindow {
        #[proptest(strategy = "arbitrary_rect()")]
        geometry: Rectangle<i32, Logical>,
        opaque: bool,
    },
    Damage {
        #[proptest(strategy = "0..8usize")]
        window: usize,
        #[proptest(strategy = "arbitrary_rect()")]
        area: Rectangle<i32, Logical>,
    },
    Close {
        #[proptest(strategy = "0..8usize")]
        window: usize,
    },
    Focus {
        #[proptest(strategy = "0..8usize")]
        window: usize,
    },
    Frame {
        #[proptest(strategy = "1..120u64")]
        ms: u64,
    },
}

struct Run {
    f: Fixture,
    outputs: Vec<OutputId>,
    windows: Vec<(WindowId, SharedSurface)>,
}

impl Run {
    fn new() -> Self {
        let mut f = Fixture::new();
        let outputs = vec![f.add_output(1), f.add_output(2)];
        Self {
            f,
            outputs,
            windows: Vec::new(),
        }
    }

    fn window(&self, idx: usize) -> Option<&(WindowId, SharedSurface)> {
        if self.windows.is_empty() {
            return None;
        }
        self.windows.get(idx % self.windows.len())
    }

    fn apply(&mut self, op: &Op) {
        match op {
            Op::AddWindow { geometry, opaque } => {
                let surface = if *opaque {
                    StaticSurface::opaque(*geometry)
                } else {
                    StaticSurface::new(*geometry)
                };
                let window = self.f.add_window(surface);
                self.windows.push(window);
            }
            Op::Damage { window, area } => {
                let Some((id, surface)) = self.window(*window).cloned() else {
                    return;
                };
                surface.damage(Region::from_rect(*area));
                self.f.glaze().commit(id);
            }
            Op::Close { window } => {
                let Some((id, _)) = self.window(*window).cloned() else {
                    return;
                };
                self.f.glaze().close_window(id);
                self.windows.retain(|(w, _)| *w != id);
            }
            Op::Focus { window } => {
                let Some((id, _)) = self.window(*window).cloned() else {
                    return;
                };
                self.f.glaze().focus_window(Some(id));
            }
            Op::Frame { ms } => self.frame(Duration::from_millis(*ms)),
        }
    }

    fn frame(&mut self, by: Duration) {
        let before: Vec<_> = self
            .outputs
            .iter()
            .map(|o| self.f.glaze().frame_stats(*o).map_or(0, |s| s.frames))
            .collect();

        self.f.renderer().clear_ops();
        self.f.advance(by);

        for (output, before) in self.outputs.clone().into_iter().zip(before) {
            let Some(stats) = self.f.glaze().frame_stats(output) else {
                continue;
            };
            if stats.frames == before {
                continue;
            }
            let damage = stats.last_damage.clone();
            let painted = self
                .f
                .renderer()
                .painted_region(RenderTargetKind::Output(output));
            assert!(
                painted.contains(&damage),
                "damage {damage:?} not painted, painted {painted:?}"
            );
        }
    }
}

fn config() -> ProptestConfig {
    let cases = if std::env::var_os("RUN_SLOW_TESTS").is_some() {
        2048
    } else {
        64
    };
    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn damage_is_always_painted(ops: Vec<Op>) {
        let mut run = Run::new();
        for op in &ops {
            run.apply(op);
        }
        run.frame(Duration::from_millis(17));
    }
}

#[test]
fn window_damage_repaints_only_that_area() {
    let mut run = Run::new();
    run.apply(&Op::AddWindow {
        geometry: Rectangle::new(Point::from((100, 100)), Size::from((400, 300))),
        opaque: true,
    });
    run.f.settle(Duration::from_secs(1));

    run.apply(&Op::Damage {
        window: 0,
        area: Rectangle::new(Point::from((10, 10)), Size::from((20, 20))),
    });
    run.frame(Duration::from_millis(17));

    let stats = run.f.glaze().frame_stats(run.outputs[0]).unwrap();
    assert_eq!(
        stats.last_damage,
        Region::from_rect(Rectangle::new(Point::from((110, 110)), Size::from((20, 20))))
    );
}
