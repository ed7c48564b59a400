/// Settings for a [`LocalExecutor`](super::LocalExecutor).
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) entries: u32,
    pub(crate) sqpoll_idle: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entries: Self::DEFAULT_ENTRIES,
            sqpoll_idle: None,
        }
    }
}

impl Config {
    const DEFAULT_ENTRIES: u32 = 256;

    pub fn new() -> Self {
        Self::default()
    }

    /// Size of the submission queue. The kernel rounds it up to a power of two.
    pub fn entries(mut self, entries: u32) -> Self {
        self.entries = entries;
        self
    }

    /// Lets a kernel thread poll the submission queue, going idle after `idle_ms` without work.
    pub fn sqpoll(mut self, idle_ms: u32) -> Self {
        self.sqpoll_idle = Some(idle_ms);
        self
    }
}
