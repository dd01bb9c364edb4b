use shopdesk_db::{
    SampleDataset, SeedResult, SqlOrderRepository, SqlProductRepository, VerificationResult,
};

use crate::commands::{
    block_on, load_config, open_migrated_pool, CommandResult, Failure, EXIT_MIGRATION,
    EXIT_SEED_VERIFICATION,
};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on("seed", async {
        let pool = open_migrated_pool(&config).await?;
        let products = SqlProductRepository::new(pool.clone());
        let orders = SqlOrderRepository::new(pool.clone());

        let outcome = async {
            let seeded = SampleDataset::load(&products, &orders)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;
            let verification = SampleDataset::verify(&products, &orders)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED_VERIFICATION))?;
            Ok::<_, Failure>((seeded, verification))
        }
        .await;

        pool.close().await;
        outcome
    });

    match result {
        Ok(Ok((seeded, verification))) if verification.all_present => {
            CommandResult::success("seed", seed_message(&seeded))
        }
        Ok(Ok((_, verification))) => CommandResult::failure(
            "seed",
            "seed_verification",
            verification_message(&verification),
            EXIT_SEED_VERIFICATION,
        ),
        Ok(Err(failure)) => CommandResult::from_failure("seed", failure),
        Err(result) => result,
    }
}

fn seed_message(seeded: &SeedResult) -> String {
    format!(
        "sample catalog ready: {} products created, {} already present; {} orders created, {} already present",
        seeded.products_created, seeded.products_skipped, seeded.orders_created, seeded.orders_skipped
    )
}

fn verification_message(verification: &VerificationResult) -> String {
    let missing = verification
        .checks
        .iter()
        .filter_map(|(check, present)| (!present).then_some(*check))
        .collect::<Vec<_>>();
    if missing.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for: {}", missing.join(", "))
    }
}
