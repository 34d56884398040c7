use printqc_types::PixelRect;

/// Fixed gap for element candidate boxes.
pub const ELEMENT_MERGE_GAP: usize = 20;
// Floor and share of the shorter side for difference region gaps.
const MIN_DIFFERENCE_GAP: usize = 15;
const DIFFERENCE_GAP_RATIO: f32 = 0.025;

pub fn difference_merge_gap(width: usize, height: usize) -> usize {
    let scaled = (width.min(height) as f32 * DIFFERENCE_GAP_RATIO) as usize;
    scaled.max(MIN_DIFFERENCE_GAP)
}

/// Unions boxes whose gap-expanded rectangles overlap until no pair does.
///
/// The fixed point does not depend on input order: every union joins two
/// groups whose hulls are near, and nearness only grows as hulls grow, so
/// any order ends in the same partition. Output is sorted top-to-bottom,
/// then left-to-right.
pub fn merge_boxes(boxes: &[PixelRect], gap: usize) -> Vec<PixelRect> {
    let mut current: Vec<PixelRect> = boxes.iter().copied().filter(|b| !b.is_empty()).collect();
    loop {
        let mut merged_any = false;
        let mut result: Vec<PixelRect> = Vec::with_capacity(current.len());
        for rect in current {
            match result.iter_mut().find(|existing| existing.is_near(&rect, gap)) {
                Some(existing) => {
                    *existing = existing.union(&rect);
                    merged_any = true;
                }
                None => result.push(rect),
            }
        }
        current = result;
        if !merged_any {
            break;
        }
    }
    current.sort_by_key(|rect| (rect.y, rect.x, rect.width, rect.height));
    current
}

/// Like [`merge_boxes`], but also reports which inputs ended up in each box.
pub fn merge_groups(boxes: &[PixelRect], gap: usize) -> Vec<(PixelRect, Vec<usize>)> {
    let mut current: Vec<(PixelRect, Vec<usize>)> = boxes
        .iter()
        .enumerate()
        .filter(|(_, rect)| !rect.is_empty())
        .map(|(index, rect)| (*rect, vec![index]))
        .collect();
    loop {
        let mut merged_any = false;
        let mut result: Vec<(PixelRect, Vec<usize>)> = Vec::with_capacity(current.len());
        for (rect, members) in current {
            match result
                .iter_mut()
                .find(|(existing, _)| existing.is_near(&rect, gap))
            {
                Some((existing, existing_members)) => {
                    *existing = existing.union(&rect);
                    existing_members.extend(members);
                    merged_any = true;
                }
                None => result.push((rect, members)),
            }
        }
        current = result;
        if !merged_any {
            break;
        }
    }
    for (_, members) in current.iter_mut() {
        members.sort_unstable();
    }
    current.sort_by_key(|(rect, _)| (rect.y, rect.x, rect.width, rect.height));
    current
}
