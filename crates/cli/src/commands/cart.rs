//! Cart commands.
//!
//! The cart lives in the local storage file; none of these touch the network.

use std::sync::Arc;

use rust_decimal::Decimal;

use grocer_client::cart::CartManager;
use grocer_core::{Price, Product, ProductId};

use super::{CommandError, Context};

fn load(ctx: &Context) -> CartManager {
    CartManager::load(Arc::clone(&ctx.storage))
}

/// Print every line and the totals.
pub fn show(ctx: &Context) {
    print_cart(&load(ctx));
}

/// Add one unit of a product.
pub fn add(ctx: &Context, id: &str, price: Decimal, name: Option<String>) -> Result<(), CommandError> {
    let mut product = Product::new(ProductId::new(id), Price::new(price));
    if let Some(name) = name {
        product = product.with_detail("name", name);
    }

    let mut cart = load(ctx);
    cart.add(product)?;
    tracing::info!(product_id = id, "Added to cart");
    print_cart(&cart);
    Ok(())
}

/// Remove a product.
pub fn remove(ctx: &Context, id: &str) -> Result<(), CommandError> {
    let mut cart = load(ctx);
    cart.remove(&ProductId::new(id))?;
    print_cart(&cart);
    Ok(())
}

/// Set a product's quantity.
pub fn set_quantity(ctx: &Context, id: &str, quantity: u32) -> Result<(), CommandError> {
    let mut cart = load(ctx);
    if !cart.set_quantity(&ProductId::new(id), quantity)? {
        println!("{id} is not in the cart");
    }
    print_cart(&cart);
    Ok(())
}

/// Empty the cart.
pub fn clear(ctx: &Context) -> Result<(), CommandError> {
    load(ctx).clear()?;
    println!("Cart cleared");
    Ok(())
}

fn print_cart(cart: &CartManager) {
    if cart.is_empty() {
        println!("Cart is empty");
        return;
    }

    for item in cart.items() {
        let name = item
            .details
            .get("name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_else(|| item.id.as_str());
        println!(
            "{:<24} {:>4} x {:>10} = {:>10}",
            name,
            item.quantity,
            item.price.to_string(),
            item.line_total().to_string()
        );
    }
    println!("{} items, total {}", cart.item_count(), cart.total());
}
