//! Activity log (§3/§4.6): a plain append-only table. Compliance review reads
//! the log through ordinary SQL (`list_activity_for_business_id`), so a
//! DB-native append-only table is the better fit — see DESIGN.md.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, Row};

use plm_schemas::{Activity, ActivityAction, GroupKey};

pub async fn append_activity<'e, E>(
    exec: E,
    user_id: &str,
    action: ActivityAction,
    business_id: &str,
    version: i32,
    comment: Option<&str>,
    group_context: Option<&GroupKey>,
) -> Result<Activity>
where
    E: PgExecutor<'e>,
{
    let group_json = group_context
        .map(serde_json::to_value)
        .transpose()
        .context("failed to serialize group_context")?;

    let row = sqlx::query(
        r#"
        insert into activity (user_id, action, business_id, version, comment, group_context)
        values ($1, $2, $3, $4, $5, $6)
        returning id, user_id, action, business_id, version, comment, group_context, ts
        "#,
    )
    .bind(user_id)
    .bind(action_str(action))
    .bind(business_id)
    .bind(version)
    .bind(comment)
    .bind(group_json)
    .fetch_one(exec)
    .await
    .context("append_activity failed")?;

    row_to_activity(row)
}

pub async fn list_activity_for_business_id<'e, E>(
    exec: E,
    business_id: &str,
) -> Result<Vec<Activity>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        select id, user_id, action, business_id, version, comment, group_context, ts
        from activity
        where business_id = $1
        order by ts asc, id asc
        "#,
    )
    .bind(business_id)
    .fetch_all(exec)
    .await
    .context("list_activity_for_business_id failed")?;

    rows.into_iter().map(row_to_activity).collect()
}

fn row_to_activity(row: sqlx::postgres::PgRow) -> Result<Activity> {
    let action: String = row.try_get("action")?;
    let group_context: Option<serde_json::Value> = row.try_get("group_context")?;
    let ts: DateTime<Utc> = row.try_get("ts")?;

    Ok(Activity {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        action: parse_action(&action)?,
        business_id: row.try_get("business_id")?,
        version: row.try_get("version")?,
        comment: row.try_get("comment")?,
        group_context: group_context
            .map(serde_json::from_value)
            .transpose()
            .context("failed to deserialize group_context")?,
        ts,
    })
}

fn action_str(action: ActivityAction) -> &'static str {
    match action {
        ActivityAction::Create => "CREATE",
        ActivityAction::RequestRelease => "REQUEST_RELEASE",
        ActivityAction::Authorise => "AUTHORISE",
        ActivityAction::StatusReset => "STATUS_RESET",
        ActivityAction::GroupMigration => "GROUP_MIGRATION",
        ActivityAction::RecalculateScope => "RECALCULATE_SCOPE",
    }
}

fn parse_action(s: &str) -> Result<ActivityAction> {
    match s {
        "CREATE" => Ok(ActivityAction::Create),
        "REQUEST_RELEASE" => Ok(ActivityAction::RequestRelease),
        "AUTHORISE" => Ok(ActivityAction::Authorise),
        "STATUS_RESET" => Ok(ActivityAction::StatusReset),
        "GROUP_MIGRATION" => Ok(ActivityAction::GroupMigration),
        "RECALCULATE_SCOPE" => Ok(ActivityAction::RecalculateScope),
        other => anyhow::bail!("invalid activity action: {other}"),
    }
}
