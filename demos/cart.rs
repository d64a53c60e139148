//! Demonstration of a structured value bound in an isolated context

use serde::{Deserialize, Serialize};
use tincan_session::storage::MemoryStorage;
use tincan_session::{SessionContext, SessionStore};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Cart {
    items: Vec<CartItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CartItem {
    sku: String,
    quantity: u32,
}

impl Cart {
    fn add(mut self, sku: &str) -> Self {
        match self.items.iter_mut().find(|item| item.sku == sku) {
            Some(item) => item.quantity += 1,
            None => self.items.push(CartItem {
                sku: sku.to_string(),
                quantity: 1,
            }),
        }
        self
    }

    fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Cart Demo ===\n");

    // One browsing session, reopened by a second context ("page reload")
    let session = MemoryStorage::new();

    let first_page = SessionStore::new(SessionContext::builder().storage(session.clone()).build());
    let cart = first_page.bind("cart", Cart::default()).expect("bind cart");
    let badge = first_page.bind("cart", Cart::default()).expect("bind badge");

    let _watch = badge.watch(|cart: Option<Cart>| {
        let count = cart.map(|c| c.total_quantity()).unwrap_or(0);
        println!("  badge: {} item(s)", count);
    });

    for sku in ["apple", "pear", "apple"] {
        cart.update(|prev| prev.unwrap_or_default().add(sku))
            .expect("add to cart");
    }
    drop((cart, badge, _watch));

    println!("\nReloading page...");
    let second_page = SessionStore::new(SessionContext::builder().storage(session).build());
    let cart = second_page.bind("cart", Cart::default()).expect("rebind cart");
    println!("Restored cart: {:?}", cart.get());

    cart.unset();
    println!("After checkout: {:?}", cart.get());
}
