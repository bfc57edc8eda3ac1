use gust_runner::prelude::UserValuesConstraint;

#[derive(Default, Debug)]
pub struct DefaultScenarioValues;

impl UserValuesConstraint for DefaultScenarioValues {}

/// HTTP specific agent context values.
///
/// `SV` is for values that a scenario wants to keep per virtual user.
#[derive(Default, Debug)]
pub struct HttpAgentContext<SV: UserValuesConstraint = DefaultScenarioValues> {
    pub scenario_values: SV,
}

impl<SV: UserValuesConstraint> UserValuesConstraint for HttpAgentContext<SV> {}
