//! Spatial hashing for neighbor search.
//!
//! Positions are bucketed with a counting sort into a compressed layout:
//! `cell_start[h]..cell_start[h + 1]` indexes the slice of `cell_entries`
//! holding every particle whose cell hashes to bucket `h`. Distinct cells may
//! share a bucket, so query results are candidates and callers re-check exact
//! distances.

use bevy::log::debug;
use bevy::prelude::*;

/// Large primes for hash mixing.
const P1: i32 = 92_837_111;
const P2: i32 = 689_289_499;
const P3: i32 = 283_923_481;

/// Uniform-grid spatial hash with a fixed bucket table.
#[derive(Clone, Debug)]
pub struct SpatialHash {
    /// Edge length of a grid cell.
    spacing: f32,
    /// Number of hash buckets.
    table_size: usize,
    /// Bucket offsets into `cell_entries`, length `table_size + 1`.
    cell_start: Vec<usize>,
    /// Particle indices sorted by bucket.
    cell_entries: Vec<usize>,
    /// Reusable result buffer for [`SpatialHash::query`].
    query_ids: Vec<usize>,
    /// Per-bucket stamp so a bucket shared by several cells is read once per query.
    bucket_stamp: Vec<u32>,
    stamp: u32,
    /// Adjacency offsets into `adj_ids`, length `n + 1` after [`SpatialHash::query_all`].
    first_adj_id: Vec<usize>,
    adj_ids: Vec<usize>,
}

impl SpatialHash {
    /// Create a hash for roughly `expected_particles` entries.
    ///
    /// The table gets twice as many buckets as expected entries and grows on
    /// rebuild if the particle count outpaces it.
    pub fn new(spacing: f32, expected_particles: usize) -> Self {
        let spacing = if spacing > 0.0 { spacing } else { 1.0 };
        let table_size = (2 * expected_particles).max(1);
        Self {
            spacing,
            table_size,
            cell_start: vec![0; table_size + 1],
            cell_entries: Vec::new(),
            query_ids: Vec::new(),
            bucket_stamp: vec![0; table_size],
            stamp: 0,
            first_adj_id: vec![0],
            adj_ids: Vec::new(),
        }
    }

    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    pub fn table_size(&self) -> usize {
        self.table_size
    }

    /// Number of particles in the last rebuild.
    pub fn len(&self) -> usize {
        self.cell_entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_entries.is_empty()
    }

    /// Integer cell containing `position`, flooring toward negative infinity.
    #[inline]
    pub fn cell_coord(&self, position: Vec3) -> IVec3 {
        (position / self.spacing).floor().as_ivec3()
    }

    /// Bucket index of a cell.
    #[inline]
    pub fn hash_cell(&self, cell: IVec3) -> usize {
        let h = cell.x.wrapping_mul(P1) ^ cell.y.wrapping_mul(P2) ^ cell.z.wrapping_mul(P3);
        h.unsigned_abs() as usize % self.table_size
    }

    #[inline]
    pub fn hash_position(&self, position: Vec3) -> usize {
        self.hash_cell(self.cell_coord(position))
    }

    /// Rebuild the bucket layout from `positions`.
    ///
    /// Must run before any query in a frame and again whenever positions have
    /// moved further than the query radius.
    pub fn rebuild(&mut self, positions: &[Vec3]) {
        let n = positions.len();
        if 2 * n > self.table_size {
            let table_size = 2 * n;
            debug!(
                "spatial hash table grown from {} to {} buckets",
                self.table_size, table_size
            );
            self.table_size = table_size;
            self.bucket_stamp = vec![0; table_size];
            self.stamp = 0;
        }

        self.cell_start.clear();
        self.cell_start.resize(self.table_size + 1, 0);
        self.cell_entries.clear();
        self.cell_entries.resize(n, 0);

        for &p in positions {
            let h = self.hash_position(p);
            self.cell_start[h] += 1;
        }

        let mut start = 0;
        for i in 0..self.table_size {
            start += self.cell_start[i];
            self.cell_start[i] = start;
        }
        self.cell_start[self.table_size] = start;

        for (i, &p) in positions.iter().enumerate() {
            let h = self.hash_position(p);
            self.cell_start[h] -= 1;
            self.cell_entries[self.cell_start[h]] = i;
        }
    }

    /// Particle indices in bucket `h`.
    #[inline]
    fn bucket(&self, h: usize) -> &[usize] {
        &self.cell_entries[self.cell_start[h]..self.cell_start[h + 1]]
    }

    fn next_stamp(&mut self) -> u32 {
        self.stamp = self.stamp.wrapping_add(1);
        if self.stamp == 0 {
            self.bucket_stamp.fill(0);
            self.stamp = 1;
        }
        self.stamp
    }

    /// Candidate particles in every cell overlapping the sphere at `point`.
    ///
    /// With `radius <= spacing` this visits at most the 27 surrounding cells.
    /// Results are not distance filtered.
    pub fn query(&mut self, point: Vec3, radius: f32) -> &[usize] {
        self.query_ids.clear();
        if self.cell_entries.is_empty() {
            return &self.query_ids;
        }

        let stamp = self.next_stamp();
        let min = self.cell_coord(point - Vec3::splat(radius));
        let max = self.cell_coord(point + Vec3::splat(radius));

        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    let h = self.hash_cell(IVec3::new(x, y, z));
                    if self.bucket_stamp[h] == stamp {
                        continue;
                    }
                    self.bucket_stamp[h] = stamp;
                    let (start, end) = (self.cell_start[h], self.cell_start[h + 1]);
                    self.query_ids.extend_from_slice(&self.cell_entries[start..end]);
                }
            }
        }

        &self.query_ids
    }

    /// Build the symmetric adjacency of every pair closer than `max_dist`.
    ///
    /// `positions` must be the slice the hash was last rebuilt from. Each
    /// neighbor list is sorted and free of duplicates.
    pub fn query_all(&mut self, positions: &[Vec3], max_dist: f32) {
        let n = positions.len();
        debug_assert_eq!(n, self.cell_entries.len(), "query_all needs a fresh rebuild");

        let max_dist_sq = max_dist * max_dist;
        let mut pairs = Vec::new();
        for (i, &p) in positions.iter().enumerate() {
            for &j in self.query(p, max_dist) {
                if j > i && positions[j].distance_squared(p) <= max_dist_sq {
                    pairs.push((i, j));
                }
            }
        }

        self.first_adj_id.clear();
        self.first_adj_id.resize(n + 1, 0);
        for &(i, j) in &pairs {
            self.first_adj_id[i] += 1;
            self.first_adj_id[j] += 1;
        }
        let mut start = 0;
        for i in 0..n {
            start += self.first_adj_id[i];
            self.first_adj_id[i] = start;
        }
        self.first_adj_id[n] = start;

        self.adj_ids.clear();
        self.adj_ids.resize(start, 0);
        for &(i, j) in &pairs {
            self.first_adj_id[i] -= 1;
            self.adj_ids[self.first_adj_id[i]] = j;
            self.first_adj_id[j] -= 1;
            self.adj_ids[self.first_adj_id[j]] = i;
        }
        for i in 0..n {
            let (start, end) = (self.first_adj_id[i], self.first_adj_id[i + 1]);
            self.adj_ids[start..end].sort_unstable();
        }
    }

    /// Neighbors of particle `i` from the last [`SpatialHash::query_all`].
    pub fn neighbors(&self, i: usize) -> &[usize] {
        match (self.first_adj_id.get(i), self.first_adj_id.get(i + 1)) {
            (Some(&start), Some(&end)) => &self.adj_ids[start..end],
            _ => &[],
        }
    }

    /// Raw adjacency layout `(first_adj_id, adj_ids)`.
    pub fn adjacency(&self) -> (&[usize], &[usize]) {
        (&self.first_adj_id, &self.adj_ids)
    }

    /// Number of unordered pairs found by the last [`SpatialHash::query_all`].
    pub fn pair_count(&self) -> usize {
        self.adj_ids.len() / 2
    }

    /// Entries that share the bucket of `position`, for diagnostics.
    pub fn bucket_of(&self, position: Vec3) -> &[usize] {
        if self.cell_entries.is_empty() {
            return &[];
        }
        self.bucket(self.hash_position(position))
    }
}
