//! Cache commands.

use grocer_client::cache::CacheKey;

use super::Context;

/// Print the cache's age, validity and which datasets are present.
pub fn status(ctx: &Context) {
    let cache = ctx.cache();

    match cache.age() {
        Some(age) => println!(
            "Last write {}s ago ({}, window {}s)",
            age.as_secs(),
            if cache.is_valid() { "valid" } else { "expired" },
            cache.ttl().as_secs()
        ),
        None => println!("Cache is empty"),
    }

    for key in CacheKey::ALL {
        let present = ctx.storage.get_item(key.storage_key()).is_some();
        println!("  {:<16} {}", key.storage_key(), if present { "cached" } else { "-" });
    }
}

/// Remove every cached dataset and the timestamp.
pub fn clear(ctx: &Context) {
    ctx.cache().clear();
    println!("Cache cleared");
}
