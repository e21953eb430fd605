//! `plm-cli migrate` applies pending SQLx migrations idempotently.
//!
//! DB-backed test, skipped if PLM_DATABASE_URL is not set.

#[tokio::test]
async fn cli_migrate_succeeds_and_is_idempotent() -> anyhow::Result<()> {
    let url = match std::env::var(plm_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: PLM_DATABASE_URL not set");
            return Ok(());
        }
    };

    let mut cmd = assert_cmd::Command::cargo_bin("plm-cli")?;
    cmd.env(plm_db::ENV_DB_URL, &url).args(["migrate"]);
    cmd.assert().success();

    // Running it again against an already-migrated database must not fail.
    let mut cmd2 = assert_cmd::Command::cargo_bin("plm-cli")?;
    cmd2.env(plm_db::ENV_DB_URL, &url).args(["migrate"]);
    cmd2.assert().success();

    Ok(())
}
