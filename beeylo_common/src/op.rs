//! Implements the arithmetic operator traits for single-field newtypes such as [`crate::Money`].

#[macro_export]
macro_rules! op {
    (binary $type:ty, $trait:ident, $func:ident) => {
        impl std::ops::$trait for $type {
            type Output = Self;

            fn $func(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$func(self.0, rhs.0))
            }
        }
    };
    (inplace $type:ty, $trait:ident, $func:ident) => {
        impl std::ops::$trait for $type {
            fn $func(&mut self, rhs: Self) {
                std::ops::$trait::$func(&mut self.0, rhs.0)
            }
        }
    };
    (unary $type:ty, $trait:ident, $func:ident) => {
        impl std::ops::$trait for $type {
            type Output = Self;

            fn $func(self) -> Self::Output {
                Self(std::ops::$trait::$func(self.0))
            }
        }
    };
}
