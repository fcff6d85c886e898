/// A fallible primitive result: `value` is meaningful only when `is_set` is true, and is zero
/// otherwise.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Maybe<T> {
    pub is_set: bool,
    pub value: T,
}

pub type MaybeBool = Maybe<bool>;
pub type MaybeI32 = Maybe<i32>;
pub type MaybeU32 = Maybe<u32>;
pub type MaybeI64 = Maybe<i64>;
pub type MaybeF64 = Maybe<f64>;

impl<T: Default> Maybe<T> {
    pub fn absent() -> Self {
        Maybe {
            is_set: false,
            value: T::default(),
        }
    }

    pub fn present(value: T) -> Self {
        Maybe {
            is_set: true,
            value,
        }
    }

    pub fn into_option(self) -> Option<T> {
        self.is_set.then_some(self.value)
    }
}

impl<T: Default> From<Option<T>> for Maybe<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Maybe::present(value),
            None => Maybe::absent(),
        }
    }
}
