use tabled::Tabled;

#[derive(Tabled)]
pub struct CheckRow {
    pub check: String,
    pub passes: u64,
    pub fails: u64,
    #[tabled(display = "percent")]
    pub pass_rate: Option<f64>,
}

fn percent(n: &Option<f64>) -> String {
    match n {
        Some(n) => format!("{:.2}%", n * 100.0),
        None => "-".to_string(),
    }
}
