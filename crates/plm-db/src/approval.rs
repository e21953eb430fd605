//! Approval store (§4.6): request-release / authorise / reset against the
//! `approval` table. Segregation-of-duties (`requested_by <> authorized_by`)
//! is enforced twice — once here before the write, once by the
//! `chk_approval_sod` constraint as a backstop.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::{PgExecutor, Row};

use plm_schemas::Approval;

pub async fn fetch_approval<'e, E>(
    exec: E,
    business_id: &str,
    version: i32,
) -> Result<Option<Approval>>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        select business_id, version, requested_by, requested_at, request_comment,
               authorized_by, authorized_at, authorize_comment
        from approval
        where business_id = $1 and version = $2
        "#,
    )
    .bind(business_id)
    .bind(version)
    .fetch_optional(exec)
    .await
    .context("fetch_approval failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(row_to_approval(row)?))
}

/// `REQUEST_RELEASE` (§4.6): creates or overwrites the request side of the row.
/// Leaves any existing authorisation untouched unless it would now violate
/// segregation-of-duties, in which case it is cleared (a later version's
/// requester cannot ride on a stale authorisation by a different version).
pub async fn approval_request_release<'e, E>(
    exec: E,
    business_id: &str,
    version: i32,
    requested_by: &str,
    comment: Option<&str>,
) -> Result<Approval>
where
    E: PgExecutor<'e> + Copy,
{
    let existing = fetch_approval(exec, business_id, version).await?;
    if let Some(existing) = &existing {
        if let Some(authorized_by) = &existing.authorized_by {
            if authorized_by == requested_by {
                bail!(
                    "segregation of duties violation: {requested_by} already authorized this version"
                );
            }
        }
    }

    let now = Utc::now();
    sqlx::query(
        r#"
        insert into approval (business_id, version, requested_by, requested_at, request_comment)
        values ($1, $2, $3, $4, $5)
        on conflict (business_id, version)
        do update set
            requested_by = excluded.requested_by,
            requested_at = excluded.requested_at,
            request_comment = excluded.request_comment
        "#,
    )
    .bind(business_id)
    .bind(version)
    .bind(requested_by)
    .bind(now)
    .bind(comment)
    .execute(exec)
    .await
    .context("approval_request_release failed")?;

    fetch_approval(exec, business_id, version)
        .await?
        .context("approval row missing immediately after request_release")
}

/// `AUTHORISE` (§4.6): requires a prior `REQUEST_RELEASE` by a different user.
pub async fn approval_authorise<'e, E>(
    exec: E,
    business_id: &str,
    version: i32,
    authorized_by: &str,
    comment: Option<&str>,
) -> Result<Approval>
where
    E: PgExecutor<'e> + Copy,
{
    let existing = fetch_approval(exec, business_id, version)
        .await?
        .context("cannot authorise: no release has been requested for this version")?;

    let Some(requested_by) = &existing.requested_by else {
        bail!("cannot authorise: no release has been requested for this version");
    };
    if requested_by == authorized_by {
        bail!("segregation of duties violation: requester and authoriser must differ");
    }

    let now = Utc::now();
    sqlx::query(
        r#"
        update approval
           set authorized_by = $3, authorized_at = $4, authorize_comment = $5
         where business_id = $1 and version = $2
        "#,
    )
    .bind(business_id)
    .bind(version)
    .bind(authorized_by)
    .bind(now)
    .bind(comment)
    .execute(exec)
    .await
    .context("approval_authorise failed")?;

    fetch_approval(exec, business_id, version)
        .await?
        .context("approval row missing immediately after authorise")
}

/// Implicit reset on a new version landing (§4.6): deletes any approval row
/// for `version`, so a fresh version always starts at `BLOCKED`/`CREATED`.
pub async fn approval_reset<'e, E>(exec: E, business_id: &str, version: i32) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query("delete from approval where business_id = $1 and version = $2")
        .bind(business_id)
        .bind(version)
        .execute(exec)
        .await
        .context("approval_reset failed")?;
    Ok(())
}

fn row_to_approval(row: sqlx::postgres::PgRow) -> Result<Approval> {
    Ok(Approval {
        business_id: row.try_get("business_id")?,
        version: row.try_get("version")?,
        requested_by: row.try_get("requested_by")?,
        requested_at: row.try_get("requested_at")?,
        request_comment: row.try_get("request_comment")?,
        authorized_by: row.try_get("authorized_by")?,
        authorized_at: row.try_get("authorized_at")?,
        authorize_comment: row.try_get("authorize_comment")?,
    })
}
