/// Declares non-blocking operations.
///
/// Each declaration expands to an [`Operation`](crate::Operation) descriptor type and an
/// `async fn` entry point that drives it on the process-wide scheduler, forwarding the
/// arguments verbatim to the `start` step:
///
/// ```ignore
/// nonblocking! {
///     /// Checks whether the server is alive.
///     pub async fn ping(conn: &mut Conn) -> c_int as Ping {
///         start: |out, conn| unsafe { ffi::mysql_ping_start(out, conn.as_ptr()) },
///         resume: |out, conn, status| unsafe { ffi::mysql_ping_cont(out, conn.as_ptr(), status.into()) },
///     }
///
///     pub async fn select_db<'a>(conn: &mut Conn, db: &'a CStr) -> c_int as SelectDb {
///         start: |out, conn, db| unsafe { ffi::mysql_select_db_start(out, conn.as_ptr(), db.as_ptr()) },
///         resume: |out, conn, status| unsafe { ffi::mysql_select_db_cont(out, conn.as_ptr(), status.into()) },
///     }
/// }
/// ```
///
/// The step bodies may evaluate to a [`Status`](crate::Status) or to anything convertible into
/// one, such as the raw `c_int` returned by a C library. Borrowed arguments must name the
/// declaration's lifetime parameter.
#[macro_export]
macro_rules! nonblocking {
    () => {};

    (
        $(#[$meta:meta])*
        $vis:vis async fn $name:ident <$lt:lifetime> (
            $handle:ident : &mut $handle_ty:ty $(, $arg:ident : $arg_ty:ty)* $(,)?
        ) -> $out:ty as $op:ident {
            start: |$s_out:ident, $s_handle:ident $(, $s_arg:ident)*| $start:expr,
            resume: |$r_out:ident, $r_handle:ident, $r_status:ident| $resume:expr $(,)?
        }

        $($rest:tt)*
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $op;

        impl $crate::Operation for $op {
            type Handle = $handle_ty;
            type Args<$lt> = ($($arg_ty,)*);
            type Output = $out;

            fn start(
                $s_out: &mut $out,
                $s_handle: &mut $handle_ty,
                ($($s_arg,)*): Self::Args<'_>,
            ) -> $crate::Status {
                $crate::Status::from($start)
            }

            fn resume(
                $r_out: &mut $out,
                $r_handle: &mut $handle_ty,
                $r_status: $crate::Status,
            ) -> $crate::Status {
                $crate::Status::from($resume)
            }
        }

        $(#[$meta])*
        $vis async fn $name<$lt>($handle: &mut $handle_ty $(, $arg: $arg_ty)*) -> $out {
            $crate::drive::<$op>($handle, ($($arg,)*)).await
        }

        $crate::nonblocking! { $($rest)* }
    };

    (
        $(#[$meta:meta])*
        $vis:vis async fn $name:ident (
            $($params:tt)*
        ) -> $out:ty as $op:ident {
            $($steps:tt)*
        }

        $($rest:tt)*
    ) => {
        $crate::nonblocking! {
            $(#[$meta])*
            $vis async fn $name<'a>($($params)*) -> $out as $op {
                $($steps)*
            }

            $($rest)*
        }
    };
}
