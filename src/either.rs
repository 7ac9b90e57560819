// (c) Copyright 2025 Helsing GmbH. All rights reserved.

//! The enum Either with variants Left and Right is a general purpose sum type
//! with two cases.
//!
//! Containers use it to hand out one iterator type for both object and array storage.
#[derive(Debug, Clone)]
pub(crate) enum Either<A, B> {
    Left(A),
    Right(B),
}

impl<A, B> Iterator for Either<A, B>
where
    A: Iterator,
    B: Iterator<Item = A::Item>,
{
    type Item = A::Item;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Either::Left(a) => a.next(),
            Either::Right(b) => b.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Either::Left(a) => a.size_hint(),
            Either::Right(b) => b.size_hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_either_side() {
        let left: Either<_, std::vec::IntoIter<u8>> = Either::Left([1_u8, 2].into_iter());
        assert_eq!(left.collect::<Vec<_>>(), [1, 2]);
        let right: Either<std::array::IntoIter<u8, 2>, _> = Either::Right(vec![3_u8].into_iter());
        assert_eq!(right.size_hint(), (1, Some(1)));
    }
}
