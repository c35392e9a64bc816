/// Fine-grained occupancy grid inside a single world cell.
///
/// Storage is lazy: the `subdivisions x subdivisions` array exists
/// only while at least one slot is occupied. Clearing the last
/// occupant releases it again, so empty cells cost one `Option` and a
/// counter.
pub struct SubdivisionCell<T> {
    subdivisions: i32,
    data: Option<Vec<Option<T>>>,
    occupied: usize,
}

impl<T> SubdivisionCell<T> {
    pub fn new(subdivisions: i32) -> Self {
        assert!(subdivisions > 0, "subdivisions must be greater than zero");
        SubdivisionCell {
            subdivisions,
            data: None,
            occupied: 0,
        }
    }

    pub fn subdivisions(&self) -> i32 {
        self.subdivisions
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied
    }

    /// True while the backing array is allocated. Holds exactly when
    /// `occupied_count() > 0`.
    pub fn is_subdivided(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_all_empty(&self) -> bool {
        self.data.is_none()
    }

    fn index(&self, sub_x: i32, sub_y: i32) -> usize {
        if sub_x < 0 || sub_x >= self.subdivisions || sub_y < 0 || sub_y >= self.subdivisions {
            panic!(
                "subcell index ({}, {}) out of range for {} subdivisions",
                sub_x, sub_y, self.subdivisions
            );
        }
        (sub_x + sub_y * self.subdivisions) as usize
    }

    pub fn get(&self, sub_x: i32, sub_y: i32) -> Option<&T> {
        let idx = self.index(sub_x, sub_y);
        self.data.as_ref().and_then(|d| d[idx].as_ref())
    }

    pub fn set(&mut self, sub_x: i32, sub_y: i32, value: Option<T>) {
        let idx = self.index(sub_x, sub_y);
        if self.data.is_none() && value.is_some() {
            let n = (self.subdivisions * self.subdivisions) as usize;
            self.data = Some((0..n).map(|_| None).collect());
        }
        if let Some(data) = self.data.as_mut() {
            match (&data[idx], &value) {
                (None, Some(_)) => self.occupied += 1,
                (Some(_), None) => self.occupied -= 1,
                _ => {}
            }
            data[idx] = value;
            if self.occupied == 0 {
                self.data = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unallocated() {
        let cell: SubdivisionCell<usize> = SubdivisionCell::new(4);
        assert!(cell.is_all_empty());
        assert!(!cell.is_subdivided());
        assert_eq!(cell.get(0, 0), None);
    }

    #[test]
    fn allocates_on_first_occupant() {
        let mut cell: SubdivisionCell<usize> = SubdivisionCell::new(4);
        cell.set(1, 2, Some(7));
        assert!(cell.is_subdivided());
        assert_eq!(cell.occupied_count(), 1);
        assert_eq!(cell.get(1, 2), Some(&7));
        assert_eq!(cell.get(2, 1), None);
    }

    #[test]
    fn releases_storage_when_last_occupant_clears() {
        let mut cell: SubdivisionCell<usize> = SubdivisionCell::new(3);
        for x in 0..3 {
            for y in 0..3 {
                cell.set(x, y, Some(1));
            }
        }
        assert_eq!(cell.occupied_count(), 9);
        for x in 0..3 {
            for y in 0..3 {
                cell.set(x, y, None);
            }
        }
        assert!(cell.is_all_empty());
        assert!(!cell.is_subdivided());
        assert_eq!(cell.occupied_count(), 0);
    }

    #[test]
    fn overwriting_occupant_keeps_count() {
        let mut cell: SubdivisionCell<usize> = SubdivisionCell::new(2);
        cell.set(0, 0, Some(1));
        cell.set(0, 0, Some(2));
        assert_eq!(cell.occupied_count(), 1);
        assert_eq!(cell.get(0, 0), Some(&2));
    }

    #[test]
    fn clearing_empty_slot_is_a_no_op() {
        let mut cell: SubdivisionCell<usize> = SubdivisionCell::new(2);
        cell.set(0, 0, None);
        assert!(cell.is_all_empty());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_index_panics() {
        let cell: SubdivisionCell<usize> = SubdivisionCell::new(2);
        cell.get(2, 0);
    }

    #[test]
    #[should_panic(expected = "greater than zero")]
    fn zero_subdivisions_rejected() {
        let _ = SubdivisionCell::<usize>::new(0);
    }
}
