use std::marker::PhantomData;

use super::sort::SortPolicy;

///struct for keeping the k best candidates of one query
///
///handles distance sorting and truncating to k items
#[derive(Debug, Clone)]
pub struct TopHits<S> {
    pub max_length: usize,
    pub distances: Vec<f64>,
    pub indices: Vec<Option<usize>>,
    num_filled: usize,
    sort: PhantomData<S>,
}

impl<S: SortPolicy> TopHits<S> {

    ///Distances are initially set to the worst distance of the ordering
    pub fn new(max_length: usize) -> Self {

        return Self {
            max_length,
            distances: vec![S::worst_distance(); max_length],
            indices: vec![None; max_length],
            num_filled: 0,
            sort: PhantomData,
        }
    }

    ///Public method to be called on every reference point for consideration as a neighbor
    ///
    ///Until the list is full every candidate is kept. Equal distances are ordered by index, so
    ///the result does not depend on the order candidates arrive in.
    pub fn try_add(&mut self, distance: f64, index: usize) {

        if self.max_length == 0 {
            return;
        }

        let full = self.is_full();
        if full && !self.ranks_before(distance, index, self.max_length - 1) {
            return;
        }

        //find insertion point
        let filled = self.num_filled;
        let insert_index = (0..filled)
            .position(|slot| self.ranks_before(distance, index, slot))
            .unwrap_or(filled);

        self.distances.insert(insert_index, distance);
        self.indices.insert(insert_index, Some(index));

        //trim to correct size
        self.distances.truncate(self.max_length);
        self.indices.truncate(self.max_length);

        if !full {
            self.num_filled += 1;
        }
    }

    fn ranks_before(&self, distance: f64, index: usize, slot: usize) -> bool {

        let held = self.distances[slot];
        if S::is_better(distance, held) {
            return true;
        }

        match self.indices[slot] {
            Some(held_index) => distance == held && index < held_index,
            None => true,
        }
    }

    pub fn is_full(&self) -> bool {
        return self.num_filled == self.max_length;
    }

    ///# Returns
    ///
    ///the k-th best distance so far, or the worst distance while the list is not full
    pub fn worst(&self) -> f64 {

        match self.max_length {
            0 => S::worst_distance(),
            _ => self.distances[self.max_length - 1],
        }
    }

    ///Filled slots as (index, distance), best first
    pub fn hits(&self) -> Vec<(usize, f64)> {

        return self.indices.iter()
            .zip(self.distances.iter())
            .filter_map(|(index, distance)| index.map(|x| (x, *distance)))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::sort::{FurthestNeighborSort, NearestNeighborSort};

    #[test]
    fn keeps_k_nearest_in_order() {

        let mut hits: TopHits<NearestNeighborSort> = TopHits::new(3);

        for (index, distance) in [5.0, 1.0, 4.0, 3.0, 2.0, 6.0].iter().enumerate() {
            hits.try_add(*distance, index);
        }

        assert!(hits.is_full());
        assert_eq!(hits.worst(), 3.0);
        assert_eq!(hits.hits(), vec![(1, 1.0), (4, 2.0), (3, 3.0)]);
    }

    #[test]
    fn ties_go_to_lower_index() {

        let mut hits: TopHits<NearestNeighborSort> = TopHits::new(2);
        hits.try_add(1.0, 2);
        hits.try_add(1.0, 0);
        hits.try_add(1.0, 1);

        assert_eq!(hits.hits(), vec![(0, 1.0), (1, 1.0)]);

        hits.try_add(0.5, 9);
        assert_eq!(hits.hits(), vec![(9, 0.5), (0, 1.0)]);
    }

    #[test]
    fn furthest_accepts_zero_distances_until_full() {

        let mut hits: TopHits<FurthestNeighborSort> = TopHits::new(2);

        hits.try_add(0.0, 7);
        assert!(!hits.is_full());
        assert_eq!(hits.worst(), 0.0);

        hits.try_add(2.0, 8);
        hits.try_add(1.0, 9);

        assert_eq!(hits.hits(), vec![(8, 2.0), (9, 1.0)]);
    }
}
