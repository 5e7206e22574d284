//! Assertion macros shared by integration tests.

/// Await a push completion and panic with contextual diagnostics on failure.
#[macro_export]
macro_rules! push_expect {
    ($fut:expr) => {{
        $fut.await
            .expect(concat!("push failed at ", file!(), ":", line!()))
    }};
    ($fut:expr, $msg:expr) => {{
        let m = ::std::format!("{msg} at {}:{}", file!(), line!(), msg = $msg);
        $fut.await.expect(&m)
    }};
}

/// Await an upgrade and panic with contextual diagnostics on failure.
#[macro_export]
macro_rules! upgrade_expect {
    ($endpoint:expr, $handshaker:expr) => {{
        $endpoint
            .upgrade(::std::boxed::Box::new($handshaker))
            .await
            .expect(concat!("upgrade failed at ", file!(), ":", line!()))
    }};
}

pub use crate::{push_expect, upgrade_expect};
