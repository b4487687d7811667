use rayon::prelude::*;

pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
    arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
        f(idx, v1);
    });
}

pub fn par_iter_reduce1<
    T1: Send + Sync,
    F: Fn(&T1) -> X + Send + Sync,
    X: Send,
    C: Fn(X, X) -> X + Send + Sync,
    I: Fn() -> X + Send + Sync,
>(
    arr1: &[T1],
    identity: I,
    combine: C,
    f: F,
) -> X {
    arr1.into_par_iter().map(|a| f(a)).reduce(identity, combine)
}
