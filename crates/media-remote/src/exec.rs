/// Where background network work runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Executor {
    /// One named helper thread per job.
    Threads,
    /// Run on the caller's thread; results still travel through the channel.
    #[cfg(test)]
    Inline,
}

impl Executor {
    pub(crate) fn spawn(self, name: &str, job: impl FnOnce() + Send + 'static) -> std::io::Result<()> {
        match self {
            Executor::Threads => std::thread::Builder::new()
                .name(name.to_string())
                .spawn(job)
                .map(|_| ()),
            #[cfg(test)]
            Executor::Inline => {
                job();
                Ok(())
            }
        }
    }
}
