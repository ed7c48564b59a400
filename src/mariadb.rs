//! MariaDB Connector/C non-blocking operations.
//!
//! Every `mysql_*_start`/`mysql_*_cont` pair of the client library is exposed as an `async fn`
//! driven on the process-wide scheduler. The connection must have been put into non-blocking
//! mode, which [`Conn::init`] does. Operation-level errors stay inside the connection; check
//! [`Conn::errno`] and [`Conn::error`] after an operation reports failure.
use std::{
    ffi::{CStr, CString},
    io,
    os::{
        raw::{c_char, c_int, c_uint, c_ulong},
        unix::io::RawFd,
    },
    ptr::{self, NonNull},
    slice,
};

use crate::drive::{Connection, Handle};

/// Raw declarations of the client library.
#[allow(non_camel_case_types)]
pub mod ffi {
    use std::{
        os::raw::{c_char, c_int, c_uint, c_ulong, c_void},
        ptr::NonNull,
    };

    pub enum MYSQL {}
    pub enum MYSQL_RES {}

    pub type my_bool = c_char;
    pub type MYSQL_ROW = Option<NonNull<*mut c_char>>;

    pub const MYSQL_OPT_NONBLOCK: c_int = 6000;

    #[link(name = "mariadb")]
    extern "C" {
        pub fn mysql_init(mysql: *mut MYSQL) -> *mut MYSQL;
        pub fn mysql_options(mysql: *mut MYSQL, option: c_int, arg: *const c_void) -> c_int;
        pub fn mysql_get_socket(mysql: *const MYSQL) -> c_int;
        pub fn mysql_get_timeout_value_ms(mysql: *const MYSQL) -> c_uint;
        pub fn mysql_errno(mysql: *mut MYSQL) -> c_uint;
        pub fn mysql_error(mysql: *mut MYSQL) -> *const c_char;
        pub fn mysql_num_fields(res: *mut MYSQL_RES) -> c_uint;
        pub fn mysql_fetch_lengths(res: *mut MYSQL_RES) -> *mut c_ulong;
        pub fn mysql_close(sock: *mut MYSQL);

        pub fn mysql_real_connect_start(
            ret: *mut Option<NonNull<MYSQL>>,
            mysql: *mut MYSQL,
            host: *const c_char,
            user: *const c_char,
            passwd: *const c_char,
            db: *const c_char,
            port: c_uint,
            unix_socket: *const c_char,
            client_flag: c_ulong,
        ) -> c_int;
        pub fn mysql_real_connect_cont(
            ret: *mut Option<NonNull<MYSQL>>,
            mysql: *mut MYSQL,
            status: c_int,
        ) -> c_int;

        pub fn mysql_real_query_start(
            ret: *mut c_int,
            mysql: *mut MYSQL,
            query: *const c_char,
            length: c_ulong,
        ) -> c_int;
        pub fn mysql_real_query_cont(ret: *mut c_int, mysql: *mut MYSQL, status: c_int) -> c_int;

        pub fn mysql_send_query_start(
            ret: *mut c_int,
            mysql: *mut MYSQL,
            query: *const c_char,
            length: c_ulong,
        ) -> c_int;
        pub fn mysql_send_query_cont(ret: *mut c_int, mysql: *mut MYSQL, status: c_int) -> c_int;

        pub fn mysql_read_query_result_start(ret: *mut my_bool, mysql: *mut MYSQL) -> c_int;
        pub fn mysql_read_query_result_cont(
            ret: *mut my_bool,
            mysql: *mut MYSQL,
            status: c_int,
        ) -> c_int;

        pub fn mysql_store_result_start(
            ret: *mut Option<NonNull<MYSQL_RES>>,
            mysql: *mut MYSQL,
        ) -> c_int;
        pub fn mysql_store_result_cont(
            ret: *mut Option<NonNull<MYSQL_RES>>,
            mysql: *mut MYSQL,
            status: c_int,
        ) -> c_int;

        pub fn mysql_next_result_start(ret: *mut c_int, mysql: *mut MYSQL) -> c_int;
        pub fn mysql_next_result_cont(ret: *mut c_int, mysql: *mut MYSQL, status: c_int) -> c_int;

        pub fn mysql_fetch_row_start(ret: *mut MYSQL_ROW, result: *mut MYSQL_RES) -> c_int;
        pub fn mysql_fetch_row_cont(
            ret: *mut MYSQL_ROW,
            result: *mut MYSQL_RES,
            status: c_int,
        ) -> c_int;

        pub fn mysql_free_result_start(result: *mut MYSQL_RES) -> c_int;
        pub fn mysql_free_result_cont(result: *mut MYSQL_RES, status: c_int) -> c_int;

        pub fn mysql_select_db_start(ret: *mut c_int, mysql: *mut MYSQL, db: *const c_char)
            -> c_int;
        pub fn mysql_select_db_cont(ret: *mut c_int, mysql: *mut MYSQL, status: c_int) -> c_int;

        pub fn mysql_set_server_option_start(
            ret: *mut c_int,
            mysql: *mut MYSQL,
            option: c_int,
        ) -> c_int;
        pub fn mysql_set_server_option_cont(
            ret: *mut c_int,
            mysql: *mut MYSQL,
            status: c_int,
        ) -> c_int;

        pub fn mysql_autocommit_start(ret: *mut my_bool, mysql: *mut MYSQL, mode: my_bool)
            -> c_int;
        pub fn mysql_autocommit_cont(ret: *mut my_bool, mysql: *mut MYSQL, status: c_int)
            -> c_int;

        pub fn mysql_commit_start(ret: *mut my_bool, mysql: *mut MYSQL) -> c_int;
        pub fn mysql_commit_cont(ret: *mut my_bool, mysql: *mut MYSQL, status: c_int) -> c_int;

        pub fn mysql_rollback_start(ret: *mut my_bool, mysql: *mut MYSQL) -> c_int;
        pub fn mysql_rollback_cont(ret: *mut my_bool, mysql: *mut MYSQL, status: c_int) -> c_int;

        pub fn mysql_ping_start(ret: *mut c_int, mysql: *mut MYSQL) -> c_int;
        pub fn mysql_ping_cont(ret: *mut c_int, mysql: *mut MYSQL, status: c_int) -> c_int;

        pub fn mysql_set_character_set_start(
            ret: *mut c_int,
            mysql: *mut MYSQL,
            csname: *const c_char,
        ) -> c_int;
        pub fn mysql_set_character_set_cont(
            ret: *mut c_int,
            mysql: *mut MYSQL,
            status: c_int,
        ) -> c_int;

        pub fn mysql_change_user_start(
            ret: *mut my_bool,
            mysql: *mut MYSQL,
            user: *const c_char,
            passwd: *const c_char,
            db: *const c_char,
        ) -> c_int;
        pub fn mysql_change_user_cont(ret: *mut my_bool, mysql: *mut MYSQL, status: c_int)
            -> c_int;

        pub fn mysql_kill_start(ret: *mut c_int, mysql: *mut MYSQL, pid: c_ulong) -> c_int;
        pub fn mysql_kill_cont(ret: *mut c_int, mysql: *mut MYSQL, status: c_int) -> c_int;

        pub fn mysql_dump_debug_info_start(ret: *mut c_int, mysql: *mut MYSQL) -> c_int;
        pub fn mysql_dump_debug_info_cont(ret: *mut c_int, mysql: *mut MYSQL, status: c_int)
            -> c_int;

        pub fn mysql_shutdown_start(ret: *mut c_int, mysql: *mut MYSQL, level: c_int) -> c_int;
        pub fn mysql_shutdown_cont(ret: *mut c_int, mysql: *mut MYSQL, status: c_int) -> c_int;

        pub fn mysql_stat_start(ret: *mut Option<NonNull<c_char>>, mysql: *mut MYSQL) -> c_int;
        pub fn mysql_stat_cont(
            ret: *mut Option<NonNull<c_char>>,
            mysql: *mut MYSQL,
            status: c_int,
        ) -> c_int;

        pub fn mysql_close_start(sock: *mut MYSQL) -> c_int;
        pub fn mysql_close_cont(sock: *mut MYSQL, status: c_int) -> c_int;
    }
}

/// A `MYSQL` connection object in non-blocking mode.
///
/// Not closed on drop; release it with [`close`].
#[derive(Debug)]
pub struct Conn {
    raw: NonNull<ffi::MYSQL>,
}

impl Conn {
    /// Allocates a connection object and switches it to non-blocking mode.
    pub fn init() -> io::Result<Self> {
        let raw = NonNull::new(unsafe { ffi::mysql_init(ptr::null_mut()) })
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "mysql_init failed"))?;

        let rc = unsafe { ffi::mysql_options(raw.as_ptr(), ffi::MYSQL_OPT_NONBLOCK, ptr::null()) };
        if rc != 0 {
            unsafe { ffi::mysql_close(raw.as_ptr()) };
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "client library does not support non-blocking mode",
            ));
        }
        Ok(Self { raw })
    }

    /// Wraps a connection object already set up for non-blocking use.
    ///
    /// # Safety
    ///
    /// `raw` must point to a live `MYSQL` object that nothing else drives.
    pub unsafe fn from_raw(raw: NonNull<ffi::MYSQL>) -> Self {
        Self { raw }
    }

    pub fn as_ptr(&self) -> *mut ffi::MYSQL {
        self.raw.as_ptr()
    }

    pub fn errno(&self) -> u32 {
        unsafe { ffi::mysql_errno(self.as_ptr()) }
    }

    pub fn error(&self) -> String {
        let msg = unsafe { ffi::mysql_error(self.as_ptr()) };
        copy_str(NonNull::new(msg as *mut c_char)).unwrap_or_default()
    }
}

impl Connection for Conn {
    fn socket(&self) -> io::Result<RawFd> {
        let fd = unsafe { ffi::mysql_get_socket(self.as_ptr()) };
        if fd < 0 {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection has no socket",
            ));
        }
        Ok(fd)
    }

    fn timeout_ms(&self) -> i64 {
        i64::from(unsafe { ffi::mysql_get_timeout_value_ms(self.as_ptr()) })
    }
}

impl Handle for Conn {
    type Connection = Self;

    fn connection(&self) -> &Self {
        self
    }
}

/// A `MYSQL_RES` result set. Waits happen on the connection that produced it.
#[derive(Debug)]
pub struct ResultSet {
    raw: NonNull<ffi::MYSQL_RES>,
    conn: Conn,
}

impl ResultSet {
    /// Wraps a result set returned by [`store_result`].
    ///
    /// # Safety
    ///
    /// `raw` must be a live result set produced by the connection `conn` points to. The result
    /// set waits on that connection, so the connection must not be closed, and no other
    /// operation may run on it, until the result set has been released with [`free_result`].
    pub unsafe fn from_raw(raw: NonNull<ffi::MYSQL_RES>, conn: NonNull<ffi::MYSQL>) -> Self {
        Self {
            raw,
            conn: Conn { raw: conn },
        }
    }

    pub fn as_ptr(&self) -> *mut ffi::MYSQL_RES {
        self.raw.as_ptr()
    }

    pub fn num_fields(&self) -> usize {
        unsafe { ffi::mysql_num_fields(self.as_ptr()) as usize }
    }
}

impl Handle for ResultSet {
    type Connection = Conn;

    fn connection(&self) -> &Conn {
        &self.conn
    }
}

fn opt_ptr(s: Option<&CStr>) -> *const c_char {
    s.map_or(ptr::null(), CStr::as_ptr)
}

fn copy_str(ptr: Option<NonNull<c_char>>) -> Option<String> {
    ptr.map(|ptr| {
        unsafe { CStr::from_ptr(ptr.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    })
}

crate::nonblocking! {
    /// Connects to the server. Yields the connection pointer on success and `None` on failure.
    pub async fn real_connect<'a>(
        conn: &mut Conn,
        host: Option<&'a CStr>,
        user: Option<&'a CStr>,
        passwd: Option<&'a CStr>,
        db: Option<&'a CStr>,
        port: c_uint,
        unix_socket: Option<&'a CStr>,
        client_flag: c_ulong,
    ) -> Option<NonNull<ffi::MYSQL>> as RealConnect {
        start: |out, conn, host, user, passwd, db, port, unix_socket, client_flag| unsafe {
            ffi::mysql_real_connect_start(
                out,
                conn.as_ptr(),
                opt_ptr(host),
                opt_ptr(user),
                opt_ptr(passwd),
                opt_ptr(db),
                port,
                opt_ptr(unix_socket),
                client_flag,
            )
        },
        resume: |out, conn, status| unsafe {
            ffi::mysql_real_connect_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Sends a query and reads the result header. Zero on success.
    pub async fn real_query<'a>(conn: &mut Conn, query: &'a [u8]) -> c_int as RealQuery {
        start: |out, conn, query| unsafe {
            ffi::mysql_real_query_start(
                out,
                conn.as_ptr(),
                query.as_ptr() as *const c_char,
                query.len() as c_ulong,
            )
        },
        resume: |out, conn, status| unsafe {
            ffi::mysql_real_query_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Sends a query without reading the result. Zero on success.
    pub async fn send_query<'a>(conn: &mut Conn, query: &'a [u8]) -> c_int as SendQuery {
        start: |out, conn, query| unsafe {
            ffi::mysql_send_query_start(
                out,
                conn.as_ptr(),
                query.as_ptr() as *const c_char,
                query.len() as c_ulong,
            )
        },
        resume: |out, conn, status| unsafe {
            ffi::mysql_send_query_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Reads the result of a query sent with [`send_query`]. Zero on success.
    pub async fn read_query_result(conn: &mut Conn) -> ffi::my_bool as ReadQueryResult {
        start: |out, conn| unsafe { ffi::mysql_read_query_result_start(out, conn.as_ptr()) },
        resume: |out, conn, status| unsafe {
            ffi::mysql_read_query_result_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Buffers the whole result set client side.
    pub async fn store_result(conn: &mut Conn) -> Option<NonNull<ffi::MYSQL_RES>> as StoreResult {
        start: |out, conn| unsafe { ffi::mysql_store_result_start(out, conn.as_ptr()) },
        resume: |out, conn, status| unsafe {
            ffi::mysql_store_result_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Advances to the next result of a multi-statement query. Zero if there is one, -1 if not.
    pub async fn next_result(conn: &mut Conn) -> c_int as NextResult {
        start: |out, conn| unsafe { ffi::mysql_next_result_start(out, conn.as_ptr()) },
        resume: |out, conn, status| unsafe {
            ffi::mysql_next_result_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Fetches the next row, `None` once the result set is exhausted.
    pub async fn fetch_row(res: &mut ResultSet) -> ffi::MYSQL_ROW as FetchRow {
        start: |out, res| unsafe { ffi::mysql_fetch_row_start(out, res.as_ptr()) },
        resume: |out, res, status| unsafe {
            ffi::mysql_fetch_row_cont(out, res.as_ptr(), status.into())
        },
    }

    async fn free_result_raw(res: &mut ResultSet) -> () as FreeResult {
        start: |_out, res| unsafe { ffi::mysql_free_result_start(res.as_ptr()) },
        resume: |_out, res, status| unsafe {
            ffi::mysql_free_result_cont(res.as_ptr(), status.into())
        },
    }

    /// Changes the default database. Zero on success.
    pub async fn select_db<'a>(conn: &mut Conn, db: &'a CStr) -> c_int as SelectDb {
        start: |out, conn, db| unsafe {
            ffi::mysql_select_db_start(out, conn.as_ptr(), db.as_ptr())
        },
        resume: |out, conn, status| unsafe {
            ffi::mysql_select_db_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Enables or disables a server option such as multi-statements. Zero on success.
    pub async fn set_server_option(conn: &mut Conn, option: c_int) -> c_int as SetServerOption {
        start: |out, conn, option| unsafe {
            ffi::mysql_set_server_option_start(out, conn.as_ptr(), option)
        },
        resume: |out, conn, status| unsafe {
            ffi::mysql_set_server_option_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Zero on success.
    pub async fn autocommit(conn: &mut Conn, mode: ffi::my_bool) -> ffi::my_bool as Autocommit {
        start: |out, conn, mode| unsafe {
            ffi::mysql_autocommit_start(out, conn.as_ptr(), mode)
        },
        resume: |out, conn, status| unsafe {
            ffi::mysql_autocommit_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Zero on success.
    pub async fn commit(conn: &mut Conn) -> ffi::my_bool as Commit {
        start: |out, conn| unsafe { ffi::mysql_commit_start(out, conn.as_ptr()) },
        resume: |out, conn, status| unsafe {
            ffi::mysql_commit_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Zero on success.
    pub async fn rollback(conn: &mut Conn) -> ffi::my_bool as Rollback {
        start: |out, conn| unsafe { ffi::mysql_rollback_start(out, conn.as_ptr()) },
        resume: |out, conn, status| unsafe {
            ffi::mysql_rollback_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Checks that the server is alive. Zero on success.
    pub async fn ping(conn: &mut Conn) -> c_int as Ping {
        start: |out, conn| unsafe { ffi::mysql_ping_start(out, conn.as_ptr()) },
        resume: |out, conn, status| unsafe {
            ffi::mysql_ping_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Zero on success.
    pub async fn set_character_set<'a>(conn: &mut Conn, csname: &'a CStr) -> c_int as SetCharacterSet {
        start: |out, conn, csname| unsafe {
            ffi::mysql_set_character_set_start(out, conn.as_ptr(), csname.as_ptr())
        },
        resume: |out, conn, status| unsafe {
            ffi::mysql_set_character_set_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Re-authenticates as another user. Zero on success.
    pub async fn change_user<'a>(
        conn: &mut Conn,
        user: &'a CStr,
        passwd: Option<&'a CStr>,
        db: Option<&'a CStr>,
    ) -> ffi::my_bool as ChangeUser {
        start: |out, conn, user, passwd, db| unsafe {
            ffi::mysql_change_user_start(out, conn.as_ptr(), user.as_ptr(), opt_ptr(passwd), opt_ptr(db))
        },
        resume: |out, conn, status| unsafe {
            ffi::mysql_change_user_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Asks the server to kill the thread `pid`. Zero on success.
    pub async fn kill(conn: &mut Conn, pid: c_ulong) -> c_int as Kill {
        start: |out, conn, pid| unsafe { ffi::mysql_kill_start(out, conn.as_ptr(), pid) },
        resume: |out, conn, status| unsafe {
            ffi::mysql_kill_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Zero on success.
    pub async fn dump_debug_info(conn: &mut Conn) -> c_int as DumpDebugInfo {
        start: |out, conn| unsafe { ffi::mysql_dump_debug_info_start(out, conn.as_ptr()) },
        resume: |out, conn, status| unsafe {
            ffi::mysql_dump_debug_info_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// Zero on success.
    pub async fn shutdown(conn: &mut Conn, level: c_int) -> c_int as Shutdown {
        start: |out, conn, level| unsafe { ffi::mysql_shutdown_start(out, conn.as_ptr(), level) },
        resume: |out, conn, status| unsafe {
            ffi::mysql_shutdown_cont(out, conn.as_ptr(), status.into())
        },
    }

    /// The raw server status line, valid until the next call on the connection.
    pub async fn stat_raw(conn: &mut Conn) -> Option<NonNull<c_char>> as Stat {
        start: |out, conn| unsafe { ffi::mysql_stat_start(out, conn.as_ptr()) },
        resume: |out, conn, status| unsafe {
            ffi::mysql_stat_cont(out, conn.as_ptr(), status.into())
        },
    }

    async fn close_raw(conn: &mut Conn) -> () as Close {
        start: |_out, conn| unsafe { ffi::mysql_close_start(conn.as_ptr()) },
        resume: |_out, conn, status| unsafe {
            ffi::mysql_close_cont(conn.as_ptr(), status.into())
        },
    }
}

/// Server status line (uptime, threads, questions, ...), `None` on error.
pub async fn stat(conn: &mut Conn) -> Option<String> {
    let line = stat_raw(conn).await;
    copy_str(line)
}

/// Closes the connection. The connection object is freed by the client library.
///
/// ```compile_fail
/// # use contio::mariadb::{close, ping, Conn};
/// async fn closed(conn: Conn) {
///     close(conn).await;
///     ping(&mut conn).await;
/// }
/// ```
pub async fn close(mut conn: Conn) {
    close_raw(&mut conn).await
}

/// Releases the result set's memory, draining unread rows from the server.
///
/// ```compile_fail
/// # use contio::mariadb::{fetch_row, free_result, ResultSet};
/// async fn freed(res: ResultSet) {
///     free_result(res).await;
///     fetch_row(&mut res).await;
/// }
/// ```
pub async fn free_result(mut res: ResultSet) {
    free_result_raw(&mut res).await
}

/// Fetches the next row as raw column bytes, `NULL` columns as `None`.
///
/// Values are copied with the lengths the client library reports, so binary columns keep
/// embedded nul bytes.
pub async fn fetch_row_values(res: &mut ResultSet) -> Option<Vec<Option<Vec<u8>>>> {
    let row = fetch_row(res).await?;
    let columns = res.num_fields();

    let lengths = match NonNull::new(unsafe { ffi::mysql_fetch_lengths(res.as_ptr()) }) {
        Some(lengths) => unsafe { slice::from_raw_parts(lengths.as_ptr(), columns) }.to_vec(),
        None => {
            log::warn!("no column lengths for fetched row, reading columns as C strings");
            (0..columns)
                .map(|i| {
                    let value = unsafe { *row.as_ptr().add(i) };
                    NonNull::new(value).map_or(0, |value| {
                        unsafe { CStr::from_ptr(value.as_ptr()) }.to_bytes().len() as c_ulong
                    })
                })
                .collect()
        }
    };

    Some(unsafe { copy_columns(row, &lengths) })
}

/// # Safety
///
/// `row` must hold `lengths.len()` column pointers, each null or readable for its length.
unsafe fn copy_columns(row: NonNull<*mut c_char>, lengths: &[c_ulong]) -> Vec<Option<Vec<u8>>> {
    lengths
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            let value = *row.as_ptr().add(i);
            NonNull::new(value).map(|value| {
                slice::from_raw_parts(value.as_ptr() as *const u8, len as usize).to_vec()
            })
        })
        .collect()
}

/// Turns a query string into a nul-free C string for the calls taking one.
pub fn c_string(s: &str) -> io::Result<CString> {
    CString::new(s).map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
}
