//! Handle to the reference tree an estimator searches.
//!
//! A tree built by the estimator from a matrix is owned together with its permutation. A tree
//! handed in by the caller is borrowed and outlives the estimator.

use crate::data::Matrix;
use crate::error::Result;
use crate::tree::SpatialTree;

#[derive(Debug)]
pub enum ReferenceTree<'a, T> {
    Owned(Box<T>, Vec<usize>),
    Borrowed(&'a T),
}

impl<'a, T: SpatialTree> ReferenceTree<'a, T> {

    /// Builds and owns a tree over `dataset`.
    pub fn build(dataset: Matrix, leaf_size: usize, metric: T::Metric) -> Self {

        let (tree, old_from_new) = T::build(dataset, leaf_size, metric);

        return ReferenceTree::Owned(Box::new(tree), old_from_new);
    }

    pub fn tree(&self) -> &T {
        match self {
            ReferenceTree::Owned(tree, _) => &**tree,
            ReferenceTree::Borrowed(tree) => *tree,
        }
    }

    pub fn is_owned(&self) -> bool {
        match self {
            ReferenceTree::Owned(..) => true,
            ReferenceTree::Borrowed(_) => false,
        }
    }

    /// Permutation from tree storage to the matrix the tree was built from. A borrowed tree has
    /// none: its storage order is the only order the estimator knows.
    pub fn old_from_new(&self) -> Option<&[usize]> {
        match self {
            ReferenceTree::Owned(_, old_from_new) => Some(old_from_new.as_slice()),
            ReferenceTree::Borrowed(_) => None,
        }
    }

    /// Maps a storage index of the tree to the index reported to callers.
    pub fn original_index(&self, storage_index: usize) -> usize {
        match self.old_from_new() {
            Some(old_from_new) => old_from_new[storage_index],
            None => storage_index,
        }
    }

    /// The reference points in the order they were handed to the estimator.
    pub fn original_dataset(&self) -> Result<Matrix> {
        match self.old_from_new() {
            Some(old_from_new) => self.tree().dataset().unpermute(old_from_new),
            None => Ok(self.tree().dataset().clone()),
        }
    }

    pub fn num_points(&self) -> usize {
        return self.tree().dataset().num_points();
    }

    pub fn dims(&self) -> usize {
        return self.tree().dataset().dims();
    }
}

impl<'a, T: Clone> Clone for ReferenceTree<'a, T> {

    fn clone(&self) -> Self {
        match self {
            ReferenceTree::Owned(tree, old_from_new) => ReferenceTree::Owned(tree.clone(), old_from_new.clone()),
            ReferenceTree::Borrowed(tree) => ReferenceTree::Borrowed(*tree),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::EuclideanDistance;
    use crate::tree::KdTree;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn owned_clone_is_deep_and_borrowed_clone_shares() {

        let mut rng = StdRng::seed_from_u64(5);
        let original = Matrix::random(2, 40, &mut rng);

        let owned: ReferenceTree<KdTree> = ReferenceTree::build(original.clone(), 5, EuclideanDistance);
        let copy = owned.clone();

        assert!(copy.is_owned());
        assert!(!std::ptr::eq(owned.tree(), copy.tree()));
        assert_eq!(copy.original_dataset().unwrap(), original);

        let borrowed = ReferenceTree::Borrowed(owned.tree());
        let shared = borrowed.clone();

        assert!(!shared.is_owned());
        assert!(std::ptr::eq(borrowed.tree(), shared.tree()));
        assert_eq!(shared.original_index(7), 7);
        assert_eq!(shared.original_dataset().unwrap(), *owned.tree().dataset());
    }
}
