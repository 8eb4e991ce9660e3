//! Arranges window thumbnails so none of them overlap.

use glaze_config::OverviewLayout;
use smithay::utils::{Logical, Point, Rectangle};

use crate::utils::{center, expand_rect, rect, united};
use crate::window::WindowId;

/// Gap kept between a thumbnail and the slot it sits in.
const SLOT_MARGIN: i32 = 10;
/// Distance two overlapping thumbnails are pushed apart per step.
const ACCURACY: f64 = 20.;
/// Bound on separation rounds, reached only by pathological inputs.
const MAX_ROUNDS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpoCell {
    pub window: WindowId,
    /// Where the window really is.
    pub natural: Rectangle<i32, Logical>,
}

/// Computes the thumbnail rectangle of every cell inside `area`.
pub fn layout(
    mode: OverviewLayout,
    area: Rectangle<i32, Logical>,
    cells: &[ExpoCell],
) -> Vec<(WindowId, Rectangle<i32, Logical>)> {
    let _span = tracy_client::span!("expo_layout::layout");

    let cells: Vec<_> = cells
        .iter()
        .filter(|c| c.natural.size.w > 0 && c.natural.size.h > 0)
        .copied()
        .collect();
    if cells.is_empty() || area.size.w <= 0 || area.size.h <= 0 {
        return Vec::new();
    }

    match mode {
        OverviewLayout::Closest => closest(area, &cells),
        OverviewLayout::Natural => natural(area, cells),
    }
}

fn distance(a: Point<i32, Logical>, b: Point<i32, Logical>) -> i64 {
    let dx = i64::from(a.x - b.x);
    let dy = i64::from(a.y - b.y);
    dx * dx + dy * dy
}

/// Puts every window into the grid slot nearest to it.
fn closest(
    area: Rectangle<i32, Logical>,
    cells: &[ExpoCell],
) -> Vec<(WindowId, Rectangle<i32, Logical>)> {
    let count = cells.len();
    let columns = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(columns);

    let slot_w = area.size.w / columns as i32;
    let slot_h = area.size.h / rows as i32;
    let slot_rect = |slot: usize| {
        rect(
            area.loc.x + (slot % columns) as i32 * slot_w,
            area.loc.y + (slot / columns) as i32 * slot_h,
            slot_w,
            slot_h,
        )
    };
    let slot_centers: Vec<_> = (0..rows * columns).map(|s| center(slot_rect(s))).collect();

    // A window takes over a slot from a farther occupier, who then looks for another one.
    let mut taken: Vec<Option<usize>> = vec![None; rows * columns];
    let mut homeless: Vec<usize> = (0..count).collect();
    while !homeless.is_empty() {
        let idx = homeless.remove(0);
        let pos = center(cells[idx].natural);

        let mut candidate = None;
        let mut best = i64::MAX;
        for (slot, slot_center) in slot_centers.iter().enumerate() {
            let dist = distance(pos, *slot_center);
            if dist >= best {
                continue;
            }
            let better = match taken[slot] {
                None => true,
                Some(other) => dist < distance(center(cells[other].natural), *slot_center),
            };
            if better {
                candidate = Some(slot);
                best = dist;
            }
        }

        let Some(slot) = candidate else {
            // Every slot has a closer occupier; the grid always has room, so take a free one.
            if let Some(slot) = taken.iter().position(Option::is_none) {
                taken[slot] = Some(idx);
            }
            continue;
        };
        if let Some(evicted) = taken[slot].replace(idx) {
            homeless.push(evicted);
        }
    }

    taken
        .iter()
        .enumerate()
        .filter_map(|(slot, idx)| {
            let cell = cells[(*idx)?];
            Some((cell.window, fit_into_slot(slot_rect(slot), cell.natural)))
        })
        .collect()
}

/// Scales a window down into a slot keeping its aspect ratio, centered.
fn fit_into_slot(
    slot: Rectangle<i32, Logical>,
    natural: Rectangle<i32, Logical>,
) -> Rectangle<i32, Logical> {
    let mut target = expand_rect(slot, -SLOT_MARGIN);
    let (nw, nh) = (f64::from(natural.size.w), f64::from(natural.size.h));

    let scale_w = f64::from(target.size.w) / nw;
    let scale_h = f64::from(target.size.h) / nh;
    let mut scale;
    if scale_w < scale_h {
        scale = scale_w;
        let h = (nh * scale) as i32;
        target.loc.y += (target.size.h - h) / 2;
        target.size.h = h;
    } else {
        scale = scale_h;
        let w = (nw * scale) as i32;
        target.loc.x += (target.size.w - w) / 2;
        target.size.w = w;
    }

    // Small windows may grow a little, large ones never do.
    let large = natural.size.w > 300 || natural.size.h > 300;
    if scale > 2. || (scale > 1. && large) {
        scale = if large { 1. } else { 2. };
        let c = center(target);
        let w = (nw * scale) as i32;
        let h = (nh * scale) as i32;
        target = rect(c.x - w / 2, c.y - h / 2, w, h);
    }

    target
}

/// Pushes overlapping windows apart until nothing overlaps, then scales the result into the area.
fn natural(
    area: Rectangle<i32, Logical>,
    mut cells: Vec<ExpoCell>,
) -> Vec<(WindowId, Rectangle<i32, Logical>)> {
    if let [cell] = cells[..] {
        if area.contains_rect(cell.natural) {
            return vec![(cell.window, cell.natural)];
        }
    }

    // Stable order, so the result does not depend on which window is focused.
    cells.sort_by_key(|c| c.window);

    let mut targets: Vec<_> = cells.iter().map(|c| c.natural).collect();
    let mut bounds = targets.iter().fold(area, |acc, r| united(acc, *r));

    let mut rounds = 0;
    loop {
        let mut overlap = false;
        for i in 0..targets.len() {
            for j in 0..targets.len() {
                if i == j {
                    continue;
                }
                if !expand_rect(targets[i], 5).overlaps(expand_rect(targets[j], 5)) {
                    continue;
                }
                overlap = true;

                let mut diff = center(targets[j]) - center(targets[i]);
                if diff.x == 0 && diff.y == 0 {
                    diff.x = 1;
                }
                let diff = scale_to_accuracy(diff);
                targets[i].loc -= diff;
                targets[j].loc += diff;

                // Pull windows sitting in an outer ninth of the bounds towards that corner, so the
                // result keeps roughly the shape of the screen.
                let pull = corner_pull(targets[i], bounds, i % 4);
                targets[i].loc += pull;

                bounds = united(bounds, targets[i]);
                bounds = united(bounds, targets[j]);
            }
        }

        rounds += 1;
        if !overlap {
            break;
        }
        if rounds >= MAX_ROUNDS {
            warn!("window thumbnails still overlap after {rounds} rounds");
            break;
        }
    }

    let (aw, ah) = (f64::from(area.size.w), f64::from(area.size.h));
    let (bw, bh) = (f64::from(bounds.size.w), f64::from(bounds.size.h));
    let scale = if bounds == area {
        1.
    } else if aw / bw < ah / bh {
        (aw - 20.) / bw
    } else {
        (ah - 20.) / bh
    };

    // Center the scaled bounds within the area.
    let origin_x = (f64::from(bounds.loc.x) * scale - (aw - 20. - bw * scale) / 2. - 10.) / scale;
    let origin_y = (f64::from(bounds.loc.y) * scale - (ah - 20. - bh * scale) / 2. - 10.) / scale;

    cells
        .iter()
        .zip(targets)
        .map(|(cell, t)| {
            let x = (f64::from(t.loc.x) - origin_x) * scale + f64::from(area.loc.x);
            let y = (f64::from(t.loc.y) - origin_y) * scale + f64::from(area.loc.y);
            let w = f64::from(t.size.w) * scale;
            let h = f64::from(t.size.h) * scale;
            (cell.window, rect(x as i32, y as i32, w as i32, h as i32))
        })
        .collect()
}

/// Rescales a vector to a manhattan length of about [`ACCURACY`].
fn scale_to_accuracy(p: Point<i32, Logical>) -> Point<i32, Logical> {
    let length = f64::from(p.x.abs() + p.y.abs());
    let factor = ACCURACY / length;
    Point::from((
        (f64::from(p.x) * factor).round() as i32,
        (f64::from(p.y) * factor).round() as i32,
    ))
}

fn corner_pull(
    target: Rectangle<i32, Logical>,
    bounds: Rectangle<i32, Logical>,
    direction: usize,
) -> Point<i32, Logical> {
    let third_w = (bounds.size.w / 3).max(1);
    let third_h = (bounds.size.h / 3).max(1);
    let mut x_section = (target.loc.x - bounds.loc.x) / third_w;
    let mut y_section = (target.loc.y - bounds.loc.y) / third_h;

    if x_section != 1 || y_section != 1 {
        if x_section == 1 {
            x_section = if direction / 2 == 1 { 2 } else { 0 };
        }
        if y_section == 1 {
            y_section = if direction % 2 == 1 { 2 } else { 0 };
        }
    }

    let left = bounds.loc.x;
    let top = bounds.loc.y;
    let right = bounds.loc.x + bounds.size.w - 1;
    let bottom = bounds.loc.y + bounds.size.h - 1;
    let corner = match (x_section, y_section) {
        (0, 0) => Point::from((left, top)),
        (2, 0) => Point::from((right, top)),
        (2, 2) => Point::from((right, bottom)),
        (0, 2) => Point::from((left, bottom)),
        _ => return Point::from((0, 0)),
    };

    let diff = corner - center(target);
    if diff.x == 0 && diff.y == 0 {
        return diff;
    }
    scale_to_accuracy(diff)
}
