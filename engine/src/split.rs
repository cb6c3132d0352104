use crate::api::SplitCounts;

/// Small seeded PRNG; the same seed reproduces the service's split order.
#[derive(Clone, Debug)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x6d2b_79f5);
        let t = self.state;
        let mut r = (t ^ (t >> 15)).wrapping_mul(1 | t);
        r ^= r.wrapping_add((r ^ (r >> 7)).wrapping_mul(61 | r));
        f64::from(r ^ (r >> 14)) / 4_294_967_296.0
    }
}

pub fn seeded_shuffle<T: Clone>(items: &[T], seed: u32) -> Vec<T> {
    let mut shuffled = items.to_vec();
    let mut rng = Mulberry32::new(seed);
    for i in (1..shuffled.len()).rev() {
        let j = (rng.next_f64() * (i + 1) as f64).floor() as usize;
        shuffled.swap(i, j.min(i));
    }
    shuffled
}

/// Largest-remainder apportionment of `total` items over train/val/test.
pub fn split_counts(total: u32, ratios: [u32; 3]) -> SplitCounts {
    let sum: u32 = ratios.iter().sum();
    if total == 0 || sum == 0 {
        return SplitCounts::default();
    }
    let raw: Vec<f64> = ratios
        .iter()
        .map(|&r| f64::from(r) / f64::from(sum) * f64::from(total))
        .collect();
    let mut counts: Vec<u32> = raw.iter().map(|c| c.floor() as u32).collect();
    let mut remaining = total.saturating_sub(counts.iter().sum());

    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = raw[a] - raw[a].floor();
        let fb = raw[b] - raw[b].floor();
        fb.total_cmp(&fa)
    });
    for idx in order {
        if remaining == 0 {
            break;
        }
        counts[idx] += 1;
        remaining -= 1;
    }
    SplitCounts {
        train: counts[0],
        val: counts[1],
        test: counts[2],
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SplitPreview {
    pub counts: SplitCounts,
    pub train: Vec<String>,
    pub val: Vec<String>,
    pub test: Vec<String>,
}

pub fn preview_split(images: &[String], ratios: [u32; 3], seed: u32) -> SplitPreview {
    let counts = split_counts(images.len() as u32, ratios);
    let shuffled = seeded_shuffle(images, seed);
    let train_end = counts.train as usize;
    let val_end = train_end + counts.val as usize;
    let test_end = (val_end + counts.test as usize).min(shuffled.len());
    SplitPreview {
        counts,
        train: shuffled[..train_end.min(test_end)].to_vec(),
        val: shuffled[train_end.min(test_end)..val_end.min(test_end)].to_vec(),
        test: shuffled[val_end.min(test_end)..test_end].to_vec(),
    }
}
