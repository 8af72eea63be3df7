/// Writer configuration, forwarded by the stack to every table writer it
/// constructs.
#[derive(Debug, Clone)]
pub struct Config {
    /// If `true`, table files are fsynced before they are renamed into
    /// place, and the manifest is fsynced before it is published.
    pub sync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { sync: true }
    }
}
