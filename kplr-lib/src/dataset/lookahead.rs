/// Pairs each item of a fallible iterator with the item that follows it.
///
/// The last item is paired with `None`. The first error produced by the underlying
/// iterator is returned and ends the iteration.
///
/// ```
/// use kplr::dataset::Lookahead;
///
/// let items = vec![Ok::<_, ()>(1), Ok(2), Ok(3)];
/// let pairs: Vec<_> = Lookahead::new(items.into_iter()).map(Result::unwrap).collect();
/// assert_eq!(pairs, vec![(1, Some(2)), (2, Some(3)), (3, None)]);
/// ```
pub struct Lookahead<I, T> {
    iter: I,
    next: Option<T>,
    done: bool,
}

impl<I, T, E> Lookahead<I, T>
where
    I: Iterator<Item = Result<T, E>>,
{
    pub fn new(iter: I) -> Self {
        Lookahead {
            iter,
            next: None,
            done: false,
        }
    }

    /// Access the underlying iterator, e.g., to read data at an already produced item.
    pub fn get_mut(&mut self) -> &mut I {
        &mut self.iter
    }
}

impl<I, T, E> Iterator for Lookahead<I, T>
where
    I: Iterator<Item = Result<T, E>>,
    T: Clone,
{
    type Item = Result<(T, Option<T>), E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let current = match self.next.take() {
            Some(item) => item,
            None => match self.iter.next() {
                Some(Ok(item)) => item,
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    return None;
                }
            },
        };

        match self.iter.next() {
            Some(Ok(item)) => {
                self.next = Some(item.clone());
                Some(Ok((current, Some(item))))
            }
            Some(Err(err)) => {
                self.done = true;
                Some(Err(err))
            }
            None => {
                self.done = true;
                Some(Ok((current, None)))
            }
        }
    }
}
