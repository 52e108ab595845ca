//! Built-in capabilities.
//!
//! `uuid-generation` registers a `uuid4()` SQL function; `vector-similarity`
//! registers `vec_distance_cos(a, b)` and `vec_dim(v)` over JSON-encoded
//! vectors. Both are re-registration-safe, so their install actions are
//! idempotent at the statement level.

use rusqlite::Connection;
use rusqlite::functions::{Context, FunctionFlags};

use super::capability::{Capability, function_present};
use crate::errors::{GroundworkError, GroundworkResult};

pub const UUID_GENERATION: &str = "uuid-generation";
pub const VECTOR_SIMILARITY: &str = "vector-similarity";

/// Look up a built-in capability by name.
pub fn builtin(name: &str) -> Option<Capability> {
    match name {
        UUID_GENERATION => Some(uuid_generation()),
        VECTOR_SIMILARITY => Some(vector_similarity()),
        _ => None,
    }
}

/// The capability set a fresh deployment provisions when none is configured.
pub fn default_capabilities() -> Vec<Capability> {
    vec![uuid_generation(), vector_similarity()]
}

pub fn uuid_generation() -> Capability {
    Capability::new(UUID_GENERATION, 1, probe_uuid, install_uuid)
        .with_note("uuid4() text generation for application primary keys")
}

pub fn vector_similarity() -> Capability {
    Capability::new(VECTOR_SIMILARITY, 1, probe_vector, install_vector)
        .with_note("cosine distance over JSON-encoded embedding vectors")
}

fn probe_uuid(conn: &Connection) -> GroundworkResult<bool> {
    function_present(conn, "uuid4")
}

fn install_uuid(conn: &Connection) -> GroundworkResult<()> {
    conn.create_scalar_function("uuid4", 0, FunctionFlags::SQLITE_UTF8, |_| {
        Ok(uuid::Uuid::new_v4().to_string())
    })
    .map_err(|e| GroundworkError::Database(e.to_string()))
}

fn probe_vector(conn: &Connection) -> GroundworkResult<bool> {
    function_present(conn, "vec_distance_cos")
}

fn install_vector(conn: &Connection) -> GroundworkResult<()> {
    conn.create_scalar_function(
        "vec_distance_cos",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a = parse_vector(ctx, 0)?;
            let b = parse_vector(ctx, 1)?;
            cosine_distance(&a, &b)
        },
    )
    .map_err(|e| GroundworkError::Database(e.to_string()))?;

    conn.create_scalar_function(
        "vec_dim",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(parse_vector(ctx, 0)?.len() as i64),
    )
    .map_err(|e| GroundworkError::Database(e.to_string()))
}

fn parse_vector(ctx: &Context<'_>, idx: usize) -> rusqlite::Result<Vec<f64>> {
    let text: String = ctx.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::UserFunctionError(format!("invalid vector: {}", e).into())
    })
}

fn cosine_distance(a: &[f64], b: &[f64]) -> rusqlite::Result<f64> {
    if a.is_empty() || a.len() != b.len() {
        return Err(rusqlite::Error::UserFunctionError(
            format!("dimension mismatch: {} vs {}", a.len(), b.len()).into(),
        ));
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(rusqlite::Error::UserFunctionError(
            "zero-magnitude vector".into(),
        ));
    }

    Ok(1.0 - dot / (norm_a * norm_b))
}
