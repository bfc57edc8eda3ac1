/// Return this error from a virtual user's behaviour to indicate that the virtual user is bailing.
///
/// This should be used when a virtual user hits an error that it cannot recover from, but that is
/// not fatal to the scenario. The virtual user stops iterating and its slot is not refilled by the
/// ramp, so the remaining virtual users carry on with the run.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct AgentBailError {
    msg: String,
}

impl AgentBailError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for AgentBailError {
    fn default() -> Self {
        Self::new("Virtual user is bailing")
    }
}
