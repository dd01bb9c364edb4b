use crate::commands::{block_on, load_config, open_migrated_pool, CommandResult, Failure};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on("migrate", async {
        let pool = open_migrated_pool(&config).await?;
        pool.close().await;
        Ok::<(), Failure>(())
    });

    match result {
        Ok(Ok(())) => CommandResult::success("migrate", "applied pending migrations"),
        Ok(Err(failure)) => CommandResult::from_failure("migrate", failure),
        Err(result) => result,
    }
}
