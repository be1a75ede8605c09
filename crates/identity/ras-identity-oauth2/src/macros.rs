//! Method forwarding for the blocking facades.
//!
//! Each generated method calls the async [`crate::Session`] method of the same
//! name through `self.run(..)`, so all facades share one implementation.

macro_rules! blocking_methods {
    ($( $(#[$meta:meta])* fn $name:ident( $($arg:ident : $ty:ty),* ) -> $ret:ty; )*) => {
        $(
            $(#[$meta])*
            pub fn $name(&self $(, $arg: $ty)*) -> $crate::OAuth2Result<$ret> {
                let inner = &self.inner;
                self.run(move || inner.$name($($arg),*))
            }
        )*
    };
}

macro_rules! awaitable_methods {
    ($( $(#[$meta:meta])* fn $name:ident => $async_name:ident( $($arg:ident : $ty:ty),* ) -> $ret:ty; )*) => {
        blocking_methods! {
            $( $(#[$meta])* fn $name( $($arg : $ty),* ) -> $ret; )*
        }

        $(
            $(#[$meta])*
            pub async fn $async_name(&self $(, $arg: $ty)*) -> $crate::OAuth2Result<$ret> {
                self.inner.$name($($arg),*).await
            }
        )*
    };
}
