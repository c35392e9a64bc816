use rayon::prelude::*;
use std::collections::HashMap;

/// Fixed-size chunk of a 2D grid. Cells are addressed by coordinates
/// local to the chunk; out-of-range access is a caller bug and panics.
#[derive(Clone)]
pub struct Hypercell<T> {
    size: i32,
    coordinates: (i32, i32),
    cells: Vec<T>,
}

impl<T> Hypercell<T> {
    pub fn new(size: i32, coordinates: (i32, i32)) -> Self
    where
        T: Default,
    {
        assert!(size > 0, "hypercell size must be positive");
        Hypercell {
            size,
            coordinates,
            cells: (0..size * size).map(|_| T::default()).collect(),
        }
    }

    /// Build a chunk whose cells come from a producer instead of
    /// `Default` (used for cell types carrying construction
    /// parameters).
    pub fn new_with(size: i32, coordinates: (i32, i32), mut producer: impl FnMut() -> T) -> Self {
        assert!(size > 0, "hypercell size must be positive");
        Hypercell {
            size,
            coordinates,
            cells: (0..size * size).map(|_| producer()).collect(),
        }
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    /// Chunk coordinate of this hypercell in the owning map.
    pub fn coordinates(&self) -> (i32, i32) {
        self.coordinates
    }

    fn index(&self, x: i32, y: i32) -> usize {
        if x < 0 || x >= self.size || y < 0 || y >= self.size {
            panic!(
                "coordinates ({}, {}) out of range for hypercell of size {}",
                x, y, self.size
            );
        }
        (x + y * self.size) as usize
    }

    pub fn get(&self, x: i32, y: i32) -> &T {
        let idx = self.index(x, y);
        &self.cells[idx]
    }

    pub fn get_mut(&mut self, x: i32, y: i32) -> &mut T {
        let idx = self.index(x, y);
        &mut self.cells[idx]
    }

    pub fn set(&mut self, x: i32, y: i32, value: T) {
        let idx = self.index(x, y);
        self.cells[idx] = value;
    }

    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        for cell in &mut self.cells {
            *cell = value.clone();
        }
    }

    pub fn fill_with(&mut self, mut producer: impl FnMut() -> T) {
        for cell in &mut self.cells {
            *cell = producer();
        }
    }

    /// Iterate all cells with their local coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32, &T)> {
        let size = self.size;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, v)| (i as i32 % size, i as i32 / size, v))
    }
}

/// Two-level chunked grid: global `(x, y)` resolves to a chunk
/// coordinate plus a local coordinate, negative-safe. Chunks are
/// created lazily on write and never destroyed implicitly.
///
/// Reading a cell in a chunk that was never created is a caller bug:
/// call `pre_init` (or write first) before reading.
pub struct HyperMap<T> {
    chunk_size: i32,
    hypercells: HashMap<(i32, i32), Hypercell<T>>,
}

impl<T> HyperMap<T> {
    pub fn new(chunk_size: i32) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        HyperMap {
            chunk_size,
            hypercells: HashMap::new(),
        }
    }

    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    pub fn chunk_coordinates(&self, x: i32, y: i32) -> (i32, i32) {
        (x.div_euclid(self.chunk_size), y.div_euclid(self.chunk_size))
    }

    pub fn local_coordinates(&self, x: i32, y: i32) -> (i32, i32) {
        (x.rem_euclid(self.chunk_size), y.rem_euclid(self.chunk_size))
    }

    /// Eagerly create every chunk covering a `size_x` by `size_y`
    /// rectangle anchored at the origin.
    pub fn pre_init(&mut self, size_x: i32, size_y: i32) -> &mut Self
    where
        T: Default,
    {
        let chunks_x = (size_x + self.chunk_size - 1) / self.chunk_size;
        let chunks_y = (size_y + self.chunk_size - 1) / self.chunk_size;
        for cx in 0..chunks_x {
            for cy in 0..chunks_y {
                self.hypercells
                    .entry((cx, cy))
                    .or_insert_with(|| Hypercell::new(self.chunk_size, (cx, cy)));
            }
        }
        self
    }

    /// `pre_init` for cell types without a `Default`.
    pub fn pre_init_with(
        &mut self,
        size_x: i32,
        size_y: i32,
        mut producer: impl FnMut() -> T,
    ) -> &mut Self {
        let chunks_x = (size_x + self.chunk_size - 1) / self.chunk_size;
        let chunks_y = (size_y + self.chunk_size - 1) / self.chunk_size;
        for cx in 0..chunks_x {
            for cy in 0..chunks_y {
                let chunk_size = self.chunk_size;
                self.hypercells
                    .entry((cx, cy))
                    .or_insert_with(|| Hypercell::new_with(chunk_size, (cx, cy), &mut producer));
            }
        }
        self
    }

    pub fn get(&self, x: i32, y: i32) -> &T {
        let chunk = self.chunk_coordinates(x, y);
        let (lx, ly) = self.local_coordinates(x, y);
        match self.hypercells.get(&chunk) {
            Some(cell) => cell.get(lx, ly),
            None => panic!("hypercell at {:?} not created (pre_init or set first)", chunk),
        }
    }

    pub fn get_mut(&mut self, x: i32, y: i32) -> &mut T {
        let chunk = self.chunk_coordinates(x, y);
        let (lx, ly) = self.local_coordinates(x, y);
        match self.hypercells.get_mut(&chunk) {
            Some(cell) => cell.get_mut(lx, ly),
            None => panic!("hypercell at {:?} not created (pre_init or set first)", chunk),
        }
    }

    pub fn try_get(&self, x: i32, y: i32) -> Option<&T> {
        let chunk = self.chunk_coordinates(x, y);
        let (lx, ly) = self.local_coordinates(x, y);
        self.hypercells.get(&chunk).map(|cell| cell.get(lx, ly))
    }

    pub fn set(&mut self, x: i32, y: i32, value: T)
    where
        T: Default,
    {
        let (lx, ly) = self.local_coordinates(x, y);
        self.get_or_create_hypercell_for(x, y).set(lx, ly, value);
    }

    fn get_or_create_hypercell_for(&mut self, x: i32, y: i32) -> &mut Hypercell<T>
    where
        T: Default,
    {
        let chunk = self.chunk_coordinates(x, y);
        let chunk_size = self.chunk_size;
        self.hypercells
            .entry(chunk)
            .or_insert_with(|| Hypercell::new(chunk_size, chunk))
    }

    pub fn get_or_create_hypercell(&mut self, chunk_x: i32, chunk_y: i32) -> &mut Hypercell<T>
    where
        T: Default,
    {
        let chunk_size = self.chunk_size;
        self.hypercells
            .entry((chunk_x, chunk_y))
            .or_insert_with(|| Hypercell::new(chunk_size, (chunk_x, chunk_y)))
    }

    pub fn try_get_hypercell(&self, chunk_x: i32, chunk_y: i32) -> Option<&Hypercell<T>> {
        self.hypercells.get(&(chunk_x, chunk_y))
    }

    pub fn try_remove_hypercell(&mut self, chunk_x: i32, chunk_y: i32) -> Option<Hypercell<T>> {
        self.hypercells.remove(&(chunk_x, chunk_y))
    }

    pub fn all_hypercells(&self) -> impl Iterator<Item = &Hypercell<T>> {
        self.hypercells.values()
    }

    pub fn hypercell_count(&self) -> usize {
        self.hypercells.len()
    }

    /// Set every cell of every existing chunk to `value`.
    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        for cell in self.hypercells.values_mut() {
            cell.fill(value.clone());
        }
    }

    /// Initialize every cell of every existing chunk from a producer.
    pub fn fill_with(&mut self, mut producer: impl FnMut() -> T) {
        for cell in self.hypercells.values_mut() {
            cell.fill_with(&mut producer);
        }
    }
}

/// Chunk with two backing buffers: `current` is read, `next` is
/// written while a processing pass is in flight. The swap is atomic at
/// the chunk level.
pub struct DoubleBufferedHypercell<T> {
    size: i32,
    coordinates: (i32, i32),
    current: Vec<T>,
    next: Vec<T>,
    processing: bool,
}

impl<T> DoubleBufferedHypercell<T> {
    pub fn new(size: i32, coordinates: (i32, i32)) -> Self
    where
        T: Default,
    {
        assert!(size > 0, "hypercell size must be positive");
        DoubleBufferedHypercell {
            size,
            coordinates,
            current: (0..size * size).map(|_| T::default()).collect(),
            next: (0..size * size).map(|_| T::default()).collect(),
            processing: false,
        }
    }

    pub fn coordinates(&self) -> (i32, i32) {
        self.coordinates
    }

    fn index(&self, x: i32, y: i32) -> usize {
        if x < 0 || x >= self.size || y < 0 || y >= self.size {
            panic!(
                "coordinates ({}, {}) out of range for hypercell of size {}",
                x, y, self.size
            );
        }
        (x + y * self.size) as usize
    }

    /// Reads always come from the current buffer.
    pub fn get(&self, x: i32, y: i32) -> &T {
        let idx = self.index(x, y);
        &self.current[idx]
    }

    /// Writes land in `next` while processing, in `current` otherwise.
    pub fn set(&mut self, x: i32, y: i32, value: T) {
        let idx = self.index(x, y);
        if self.processing {
            self.next[idx] = value;
        } else {
            self.current[idx] = value;
        }
    }

    /// Write to the next buffer regardless of processing state.
    pub fn write_next(&mut self, x: i32, y: i32, value: T) {
        let idx = self.index(x, y);
        self.next[idx] = value;
    }

    pub fn begin_processing(&mut self) {
        self.processing = true;
    }

    /// Swap buffers and leave processing mode.
    pub fn finalize_processing(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
        self.processing = false;
    }

    pub fn fill_current(&mut self, value: T)
    where
        T: Clone,
    {
        for cell in &mut self.current {
            *cell = value.clone();
        }
    }
}

/// Chunked grid over double-buffered hypercells. Supports a
/// grid-wide transform partitioned by chunk: every worker reads only
/// the `current` buffers and writes only its own chunk's `next`
/// buffer, so the pass needs no per-cell locking.
pub struct DoubleBufferedHyperMap<T> {
    chunk_size: i32,
    hypercells: HashMap<(i32, i32), DoubleBufferedHypercell<T>>,
}

impl<T> DoubleBufferedHyperMap<T> {
    pub fn new(chunk_size: i32) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        DoubleBufferedHyperMap {
            chunk_size,
            hypercells: HashMap::new(),
        }
    }

    pub fn chunk_coordinates(&self, x: i32, y: i32) -> (i32, i32) {
        (x.div_euclid(self.chunk_size), y.div_euclid(self.chunk_size))
    }

    pub fn local_coordinates(&self, x: i32, y: i32) -> (i32, i32) {
        (x.rem_euclid(self.chunk_size), y.rem_euclid(self.chunk_size))
    }

    pub fn pre_init(&mut self, size_x: i32, size_y: i32) -> &mut Self
    where
        T: Default,
    {
        let chunks_x = (size_x + self.chunk_size - 1) / self.chunk_size;
        let chunks_y = (size_y + self.chunk_size - 1) / self.chunk_size;
        for cx in 0..chunks_x {
            for cy in 0..chunks_y {
                self.hypercells
                    .entry((cx, cy))
                    .or_insert_with(|| DoubleBufferedHypercell::new(self.chunk_size, (cx, cy)));
            }
        }
        self
    }

    pub fn get(&self, x: i32, y: i32) -> &T {
        let chunk = self.chunk_coordinates(x, y);
        let (lx, ly) = self.local_coordinates(x, y);
        match self.hypercells.get(&chunk) {
            Some(cell) => cell.get(lx, ly),
            None => panic!("hypercell at {:?} not created (pre_init first)", chunk),
        }
    }

    pub fn set(&mut self, x: i32, y: i32, value: T)
    where
        T: Default,
    {
        let chunk = self.chunk_coordinates(x, y);
        let (lx, ly) = self.local_coordinates(x, y);
        let chunk_size = self.chunk_size;
        self.hypercells
            .entry(chunk)
            .or_insert_with(|| DoubleBufferedHypercell::new(chunk_size, chunk))
            .set(lx, ly, value);
    }

    pub fn try_get_hypercell(&self, chunk_x: i32, chunk_y: i32) -> Option<&DoubleBufferedHypercell<T>> {
        self.hypercells.get(&(chunk_x, chunk_y))
    }

    pub fn all_hypercells(&self) -> impl Iterator<Item = &DoubleBufferedHypercell<T>> {
        self.hypercells.values()
    }

    pub fn begin_processing(&mut self) {
        for cell in self.hypercells.values_mut() {
            cell.begin_processing();
        }
    }

    pub fn finalize_processing(&mut self) {
        for cell in self.hypercells.values_mut() {
            cell.finalize_processing();
        }
    }

    pub fn fill_current(&mut self, value: T)
    where
        T: Clone,
    {
        for cell in self.hypercells.values_mut() {
            cell.fill_current(value.clone());
        }
    }

    /// Run `update(x, y, current_value)` over every cell of every
    /// chunk in parallel and swap all buffers afterwards. The update
    /// function sees only values from the pre-pass state.
    pub fn process_all_cells_in_parallel<F>(&mut self, update: F)
    where
        T: Send + Sync,
        F: Fn(i32, i32, &T) -> T + Sync,
    {
        self.process_all_cells_in_parallel_with_map(|x, y, _, value| update(x, y, value));
    }

    /// Like `process_all_cells_in_parallel`, but the update function
    /// also receives the map itself for neighbor reads. All reads go
    /// through `current`, so every worker observes the same
    /// consistent pre-pass view.
    pub fn process_all_cells_in_parallel_with_map<F>(&mut self, update: F)
    where
        T: Send + Sync,
        F: Fn(i32, i32, &DoubleBufferedHyperMap<T>, &T) -> T + Sync,
    {
        self.begin_processing();
        let chunk_size = self.chunk_size;
        let updates: Vec<((i32, i32), Vec<T>)> = {
            let this = &*self;
            this.hypercells
                .par_iter()
                .map(|(&coords, cell)| {
                    let base_x = coords.0 * chunk_size;
                    let base_y = coords.1 * chunk_size;
                    let mut values = Vec::with_capacity((chunk_size * chunk_size) as usize);
                    for y in 0..chunk_size {
                        for x in 0..chunk_size {
                            values.push(update(base_x + x, base_y + y, this, cell.get(x, y)));
                        }
                    }
                    (coords, values)
                })
                .collect()
        };
        for (coords, values) in updates {
            let cell = self
                .hypercells
                .get_mut(&coords)
                .expect("hypercell disappeared during processing");
            let mut it = values.into_iter();
            for y in 0..chunk_size {
                for x in 0..chunk_size {
                    cell.write_next(x, y, it.next().expect("chunk update underfilled"));
                }
            }
        }
        self.finalize_processing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut map: HyperMap<i32> = HyperMap::new(16);
        map.set(3, 5, 42);
        assert_eq!(*map.get(3, 5), 42);
    }

    #[test]
    fn negative_coordinates_resolve_to_their_own_chunk() {
        let mut map: HyperMap<i32> = HyperMap::new(16);
        map.set(-1, -1, 7);
        map.set(0, 0, 9);
        assert_eq!(map.chunk_coordinates(-1, -1), (-1, -1));
        assert_eq!(*map.get(-1, -1), 7);
        assert_eq!(*map.get(0, 0), 9);
    }

    #[test]
    fn coordinates_in_different_chunks_never_alias() {
        let mut map: HyperMap<i32> = HyperMap::new(4);
        // (3,3) and (4,3) share local coordinates with different chunks
        map.set(3, 3, 1);
        map.set(4, 3, 2);
        map.set(3, 4, 3);
        assert_eq!(*map.get(3, 3), 1);
        assert_eq!(*map.get(4, 3), 2);
        assert_eq!(*map.get(3, 4), 3);
    }

    #[test]
    fn map_starts_without_hypercells() {
        let map: HyperMap<f32> = HyperMap::new(128);
        assert_eq!(map.hypercell_count(), 0);
    }

    #[test]
    fn get_or_create_hypercell_creates_once() {
        let mut map: HyperMap<f32> = HyperMap::new(128);
        map.get_or_create_hypercell(4, -1);
        map.get_or_create_hypercell(4, -1);
        assert_eq!(map.hypercell_count(), 1);
    }

    #[test]
    fn pre_init_covers_rectangle() {
        let mut map: HyperMap<i32> = HyperMap::new(16);
        map.pre_init(33, 16);
        // 33 cells need 3 chunks horizontally, 16 need 1 vertically
        assert_eq!(map.hypercell_count(), 3);
        assert_eq!(*map.get(32, 15), 0);
    }

    #[test]
    #[should_panic(expected = "not created")]
    fn reading_uncreated_chunk_panics() {
        let map: HyperMap<i32> = HyperMap::new(16);
        map.get(100, 100);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn local_out_of_range_panics() {
        let cell: Hypercell<i32> = Hypercell::new(8, (0, 0));
        cell.get(8, 0);
    }

    #[test]
    fn try_remove_hypercell_detaches_chunk() {
        let mut map: HyperMap<i32> = HyperMap::new(8);
        map.set(1, 1, 5);
        let removed = map.try_remove_hypercell(0, 0);
        assert!(removed.is_some());
        assert!(map.try_get(1, 1).is_none());
    }

    #[test]
    fn double_buffered_reads_lag_writes_while_processing() {
        let mut cell: DoubleBufferedHypercell<i32> = DoubleBufferedHypercell::new(4, (0, 0));
        cell.set(1, 1, 10);
        cell.begin_processing();
        cell.set(1, 1, 20);
        assert_eq!(*cell.get(1, 1), 10);
        cell.finalize_processing();
        assert_eq!(*cell.get(1, 1), 20);
    }

    #[test]
    fn parallel_transform_sees_consistent_snapshot() {
        let mut map: DoubleBufferedHyperMap<i32> = DoubleBufferedHyperMap::new(4);
        map.pre_init(8, 8);
        for x in 0..8 {
            for y in 0..8 {
                map.set(x, y, x + y * 8);
            }
        }
        // each cell takes the pre-pass value of its right neighbor
        map.process_all_cells_in_parallel_with_map(|x, y, m, value| {
            if x + 1 < 8 {
                *m.get(x + 1, y)
            } else {
                *value
            }
        });
        assert_eq!(*map.get(0, 0), 1);
        assert_eq!(*map.get(3, 2), 3 + 1 + 2 * 8);
        // chunk boundary read crosses into the neighboring chunk
        assert_eq!(*map.get(3, 0), 4);
        assert_eq!(*map.get(7, 0), 7);
    }

    #[test]
    fn parallel_transform_without_map_uses_own_value() {
        let mut map: DoubleBufferedHyperMap<i32> = DoubleBufferedHyperMap::new(4);
        map.pre_init(4, 4);
        map.fill_current(2);
        map.process_all_cells_in_parallel(|_, _, value| value * 3);
        assert_eq!(*map.get(0, 0), 6);
        assert_eq!(*map.get(3, 3), 6);
    }
}
