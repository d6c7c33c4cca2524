use sqlx::{QueryBuilder, Sqlite};
use tracing_subscriber::{EnvFilter, prelude::*};

/// Installs the global tracing subscriber with an `RUST_LOG`-driven filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            tracing_subscriber::fmt::layer()
                .with_line_number(true)
                .with_file(true),
        )
        .try_init()
        .ok();
}

pub fn add_where() -> impl FnMut(&mut QueryBuilder<Sqlite>) {
    let mut first_condition = true;
    move |qb: &mut QueryBuilder<Sqlite>| {
        if first_condition {
            qb.push(" WHERE ");
            first_condition = false;
        } else {
            qb.push(" AND ");
        }
    }
}
