//! Vital sample ingestion.
//!
//! `POST /api/vitals`: one sample. Accepted with 202 and processed by the
//! resident's ingest worker; `?wait=true` returns the outcome instead.
//! `POST /api/vitals/batch`: a facility-wide batch. Invalid samples are
//! reported by index, as are samples the ingest router refuses; the rest
//! are queued.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{
    ApiContext, BatchAccepted, IngestAccepted, IngestQuery, IngestResult, RejectedSample,
    MAX_BATCH_SIZE,
};
use crate::models::VitalSample;
use crate::monitoring::IngestRouter;

pub async fn ingest(
    State(ctx): State<ApiContext>,
    Query(query): Query<IngestQuery>,
    payload: Result<Json<VitalSample>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(sample) = payload?;
    sample
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let resident_id = sample.resident_id;

    if query.wait {
        let outcome = ctx.core.router.process(sample).await?;
        return Ok(Json(IngestResult {
            resident_id,
            outcome,
        })
        .into_response());
    }

    ctx.core.router.submit(sample)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestAccepted {
            accepted: true,
            resident_id,
        }),
    )
        .into_response())
}

pub async fn ingest_batch(
    State(ctx): State<ApiContext>,
    payload: Result<Json<Vec<VitalSample>>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchAccepted>), ApiError> {
    let Json(samples) = payload?;
    if samples.len() > MAX_BATCH_SIZE {
        return Err(ApiError::BadRequest(format!(
            "Batch of {} samples exceeds the limit of {MAX_BATCH_SIZE}",
            samples.len()
        )));
    }

    let result = queue_batch(&ctx.core.router, samples);
    tracing::debug!(
        accepted = result.accepted,
        rejected = result.rejected.len(),
        "Vital batch queued"
    );
    Ok((StatusCode::ACCEPTED, Json(result)))
}

/// Queue every valid sample. A sample the router refuses is reported by
/// index like an invalid one; the rest of the batch is still queued.
fn queue_batch(router: &IngestRouter, samples: Vec<VitalSample>) -> BatchAccepted {
    let mut accepted = 0;
    let mut rejected = Vec::new();
    for (index, sample) in samples.into_iter().enumerate() {
        if let Err(e) = sample.validate() {
            rejected.push(RejectedSample {
                index,
                error: e.to_string(),
            });
            continue;
        }
        let resident_id = sample.resident_id;
        if let Err(e) = router.submit(sample) {
            tracing::warn!(index, %resident_id, error = %e, "Batch sample not queued");
            rejected.push(RejectedSample {
                index,
                error: e.to_string(),
            });
            continue;
        }
        accepted += 1;
    }
    BatchAccepted { accepted, rejected }
}
