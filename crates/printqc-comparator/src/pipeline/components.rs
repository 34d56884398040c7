use printqc_types::PixelRect;

/// Outer connected component of a binary mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub rect: PixelRect,
    /// Foreground pixels in the component.
    pub pixels: usize,
    /// Foreground pixels plus the holes the component encloses.
    pub filled_area: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connectivity {
    Four,
    Eight,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    row: usize,
    start: usize,
    end: usize,
    label: u32,
}

impl Run {
    fn touches(&self, other: &Run, connectivity: Connectivity) -> bool {
        match connectivity {
            Connectivity::Four => self.start < other.end && other.start < self.end,
            Connectivity::Eight => self.start <= other.end && other.start <= self.end,
        }
    }
}

struct RunTable {
    runs: Vec<Run>,
    // runs[offsets[row]..offsets[row + 1]] belong to `row`
    offsets: Vec<usize>,
}

impl RunTable {
    fn collect(mask: &[u8], width: usize, height: usize, foreground: bool) -> Self {
        let mut runs = Vec::new();
        let mut offsets = Vec::with_capacity(height + 1);
        for row in 0..height {
            offsets.push(runs.len());
            let line = &mask[row * width..(row + 1) * width];
            let mut x = 0;
            while x < width {
                if (line[x] > 0) != foreground {
                    x += 1;
                    continue;
                }
                let start = x;
                while x < width && (line[x] > 0) == foreground {
                    x += 1;
                }
                runs.push(Run {
                    row,
                    start,
                    end: x,
                    label: 0,
                });
            }
        }
        offsets.push(runs.len());
        Self { runs, offsets }
    }

    fn row(&self, row: usize) -> &[Run] {
        &self.runs[self.offsets[row]..self.offsets[row + 1]]
    }

    fn label(&mut self, height: usize, connectivity: Connectivity) -> DisjointSet {
        let mut dsu = DisjointSet::new();
        for run in self.runs.iter_mut() {
            run.label = dsu.make_set();
        }
        for row in 1..height {
            let mut prev = self.offsets[row - 1];
            let prev_end = self.offsets[row];
            let mut curr = self.offsets[row];
            let curr_end = self.offsets[row + 1];
            while prev < prev_end && curr < curr_end {
                let run_a = self.runs[prev];
                let run_b = self.runs[curr];
                if run_a.touches(&run_b, connectivity) {
                    dsu.union(run_a.label, run_b.label);
                }
                if run_a.end <= run_b.end {
                    prev += 1;
                } else {
                    curr += 1;
                }
            }
        }
        dsu
    }
}

#[derive(Debug, Clone, Copy)]
struct Extent {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
    area: usize,
}

impl Extent {
    fn new(run: &Run) -> Self {
        Self {
            min_x: run.start,
            min_y: run.row,
            max_x: run.end,
            max_y: run.row + 1,
            area: 0,
        }
    }

    fn add(&mut self, run: &Run) {
        self.min_x = self.min_x.min(run.start);
        self.max_x = self.max_x.max(run.end);
        self.min_y = self.min_y.min(run.row);
        self.max_y = self.max_y.max(run.row + 1);
        self.area += run.end - run.start;
    }

    fn rect(&self) -> PixelRect {
        PixelRect::new(
            self.min_x,
            self.min_y,
            self.max_x - self.min_x,
            self.max_y - self.min_y,
        )
    }
}

/// Labels 8-connected foreground components of `mask` (non-zero = set).
///
/// Each component's filled area includes the 4-connected background
/// regions it encloses, matching the area of its outer contour polygon.
/// Components are returned in top-to-bottom, left-to-right order.
pub fn external_components(mask: &[u8], width: usize, height: usize) -> Vec<Component> {
    assert_eq!(mask.len(), width * height);
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let mut foreground = RunTable::collect(mask, width, height, true);
    let mut fg_set = foreground.label(height, Connectivity::Eight);
    let mut fg_extents: Vec<Option<Extent>> = vec![None; fg_set.len()];
    for run in foreground.runs.iter_mut() {
        run.label = fg_set.find(run.label);
        fg_extents[run.label as usize]
            .get_or_insert_with(|| Extent::new(run))
            .add(run);
    }

    let mut background = RunTable::collect(mask, width, height, false);
    let mut bg_set = background.label(height, Connectivity::Four);
    let mut holes: Vec<Option<Hole>> = vec![None; bg_set.len()];
    for run in background.runs.iter() {
        let root = bg_set.find(run.label) as usize;
        let hole = holes[root].get_or_insert_with(Hole::default);
        hole.area += run.end - run.start;
        if run.row == 0 || run.row + 1 == height || run.start == 0 || run.end == width {
            hole.open = true;
            continue;
        }
        // The pixel left of a maximal background run is foreground.
        let owner = foreground
            .row(run.row)
            .iter()
            .find(|fg| fg.end == run.start)
            .map(|fg| fg.label);
        if let Some(owner) = owner {
            let owner_area = fg_extents[owner as usize].map_or(0, |extent| extent.rect().area());
            if hole.owner.is_none_or(|(_, area)| owner_area > area) {
                hole.owner = Some((owner, owner_area));
            }
        }
    }

    let mut filled: Vec<usize> = fg_extents
        .iter()
        .map(|extent| extent.map_or(0, |extent| extent.area))
        .collect();
    for hole in holes.into_iter().flatten() {
        if hole.open {
            continue;
        }
        if let Some((owner, _)) = hole.owner {
            filled[owner as usize] += hole.area;
        }
    }

    let mut components: Vec<Component> = fg_extents
        .iter()
        .enumerate()
        .filter_map(|(label, extent)| {
            extent.map(|extent| Component {
                rect: extent.rect(),
                pixels: extent.area,
                filled_area: filled[label],
            })
        })
        .collect();
    components.sort_by_key(|component| (component.rect.y, component.rect.x));
    components
}

#[derive(Debug, Clone, Copy, Default)]
struct Hole {
    area: usize,
    open: bool,
    owner: Option<(u32, usize)>,
}

struct DisjointSet {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new() -> Self {
        Self {
            parent: vec![0],
            rank: vec![0],
        }
    }

    fn len(&self) -> usize {
        self.parent.len()
    }

    fn make_set(&mut self) -> u32 {
        let idx = self.parent.len() as u32;
        self.parent.push(idx);
        self.rank.push(0);
        idx
    }

    fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut node = x;
        while self.parent[node as usize] != root {
            let next = self.parent[node as usize];
            self.parent[node as usize] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let mut root_a = self.find(a);
        let mut root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        if self.rank[root_a as usize] < self.rank[root_b as usize] {
            std::mem::swap(&mut root_a, &mut root_b);
        }
        self.parent[root_b as usize] = root_a;
        if self.rank[root_a as usize] == self.rank[root_b as usize] {
            self.rank[root_a as usize] += 1;
        }
    }
}
