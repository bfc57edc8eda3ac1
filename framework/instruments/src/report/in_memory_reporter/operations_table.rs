use tabled::Tabled;

#[derive(Tabled)]
pub struct OperationRow {
    pub operation_id: String,
    #[tabled(display = "float2_or_dash")]
    pub avg_time_ms: Option<f64>,
    #[tabled(display = "float2_or_dash")]
    pub min_time_ms: Option<f64>,
    #[tabled(display = "float2_or_dash")]
    pub max_time_ms: Option<f64>,
    #[tabled(display = "float2_or_dash")]
    pub p95_time_ms: Option<f64>,
    pub total_operations: usize,
    pub errors: usize,
}

fn float2_or_dash(n: &Option<f64>) -> String {
    match n {
        Some(n) => format!("{:.2}", n),
        None => "-".to_string(),
    }
}
