//! A small, fully-wired catalog used throughout the test suite.
//!
//! * `proj-game` ("Game Shop", merchant `m-1`, RUB by default, 1 to 15000 RUB) accepts unsigned requests.
//! * `proj-signed` only accepts signed requests; its secret is `signed-secret`.
//! * `proj-deleted` no longer accepts orders.
//! * `pm-card` (`BANKCARD`) accepts RUB and USD between 100 and 15000 RUB, via the `cardpay` handler.
//! * Payers from `KP` may not pay at all; payers from `CU` may pay with a billing address elsewhere.
use std::{collections::HashMap, sync::Arc};

use chrono::{Duration, Utc};
use pg_common::{Amount, Secret};

use crate::{
    catalog::{
        AmountLimits,
        CatalogData,
        CostSchedule,
        CountryPolicy,
        ExchangeRate,
        Merchant,
        MemoryCatalog,
        PaymentMethod,
        PaymentSystem,
        Product,
        ProductPrice,
        Project,
        ProjectStatus,
        TaxRate,
    },
    db_types::{NewOrder, Order, OrderPaymentMethod, OrderProject, OrderType, OrderUser, OrderUuid, PaymentMethodType},
    pg_api::services::{EngineServices, ProviderRegistry},
    traits::{GeoLocation, PaymentProvider},
};

pub const CARD_CALLBACK_SECRET: &str = "card-callback-secret";
pub const CARD_HANDLER: &str = "cardpay";

fn limits(min: i64, max: i64, currency: &str) -> Option<AmountLimits> {
    Some(AmountLimits {
        min: Some(Amount::from_major(min)),
        max: Some(Amount::from_major(max)),
        currency: currency.into(),
    })
}

pub fn sample_project() -> Project {
    Project {
        id: "proj-game".into(),
        merchant_id: "m-1".into(),
        name: "Game Shop".into(),
        status: ProjectStatus::InProduction,
        secret_key: Secret::new("game-secret".into()),
        default_currency: Some("RUB".into()),
        currency_required: false,
        limits: limits(1, 15000, "RUB"),
        url_success: Some("https://game.example/success".into()),
        url_fail: Some("https://game.example/fail".into()),
        url_notify: Some("https://game.example/notify".into()),
        allow_dynamic_redirect_urls: false,
        allow_dynamic_notify_urls: false,
        signed_requests: false,
    }
}

pub fn signed_project() -> Project {
    Project {
        id: "proj-signed".into(),
        name: "Signed Shop".into(),
        secret_key: Secret::new("signed-secret".into()),
        signed_requests: true,
        ..sample_project()
    }
}

fn deleted_project() -> Project {
    Project { id: "proj-deleted".into(), name: "Closed Shop".into(), status: ProjectStatus::Deleted, ..sample_project() }
}

fn method(id: &str, group: &str, method_type: PaymentMethodType, system: &str, currencies: &[&str]) -> PaymentMethod {
    PaymentMethod {
        id: id.into(),
        name: format!("{group} ({id})"),
        group: group.into(),
        method_type,
        payment_system_id: system.into(),
        currencies: currencies.iter().map(|c| c.to_string()).collect(),
        limits: None,
        active: true,
        terminal_id: None,
        callback_secret: Secret::new(format!("{id}-callback-secret")),
    }
}

fn system(id: &str, handler: &str, active: bool) -> PaymentSystem {
    PaymentSystem { id: id.into(), name: format!("System {id}"), handler: handler.into(), active, url: None }
}

fn product(id: &str, project_id: &str, enabled: bool, prices: &[(i64, &str)]) -> Product {
    Product {
        id: id.into(),
        project_id: project_id.into(),
        name: id.trim_start_matches("prod-").to_uppercase(),
        sku: Some(format!("SKU-{id}")),
        enabled,
        prices: prices.iter().map(|(minor, c)| ProductPrice { amount: Amount::from_minor(*minor), currency: c.to_string() }).collect(),
    }
}

fn schedule(method: &str, region: &str, currency: &str, percent_ppm: i64, fixed_minor: i64) -> CostSchedule {
    CostSchedule {
        payment_method_id: method.into(),
        region: region.into(),
        currency: currency.into(),
        mcc: Some("5816".into()),
        operating_company: None,
        percent_ppm,
        fixed_fee: Amount::from_minor(fixed_minor),
    }
}

fn geo(country: &str, region: &str, subdivision: Option<&str>) -> GeoLocation {
    GeoLocation { country: country.into(), region: region.into(), subdivision: subdivision.map(String::from) }
}

pub fn sample_catalog() -> CatalogData {
    let mut card = method("pm-card", "BANKCARD", PaymentMethodType::BankCard, "ps-card", &["RUB", "USD"]);
    card.name = "Bank card".into();
    card.limits = limits(100, 15000, "RUB");
    card.terminal_id = Some("T-100".into());
    card.callback_secret = Secret::new(CARD_CALLBACK_SECRET.into());
    let wallet = method("pm-wallet", "QIWI", PaymentMethodType::Ewallet, "ps-wallet", &["RUB"]);
    let crypto = method("pm-crypto", "BITCOIN", PaymentMethodType::Crypto, "ps-card", &["RUB", "USD"]);
    let legacy = method("pm-legacy", "LEGACY", PaymentMethodType::BankCard, "ps-legacy", &["RUB"]);
    let mut disabled = method("pm-disabled", "DISABLED", PaymentMethodType::BankCard, "ps-card", &["RUB"]);
    disabled.active = false;

    CatalogData {
        projects: vec![sample_project(), signed_project(), deleted_project()],
        merchants: vec![Merchant {
            id: "m-1".into(),
            country: "RU".into(),
            mcc: "5816".into(),
            operating_company: "oc-1".into(),
        }],
        payment_systems: vec![
            system("ps-card", CARD_HANDLER, true),
            system("ps-wallet", CARD_HANDLER, true),
            system("ps-legacy", "legacy", false),
        ],
        payment_methods: vec![card, wallet, crypto, legacy, disabled],
        products: vec![
            product("prod-sword", "proj-game", true, &[(10000, "RUB"), (150, "USD")]),
            product("prod-shield", "proj-game", true, &[(5000, "RUB")]),
            product("prod-usd-only", "proj-game", true, &[(200, "USD")]),
            product("prod-disabled", "proj-game", false, &[(100, "RUB")]),
            product("prod-foreign", "proj-other", true, &[(100, "RUB")]),
        ],
        currencies: vec!["RUB".into(), "USD".into(), "EUR".into(), "KZT".into()],
        country_policies: HashMap::from([
            ("KP".to_string(), CountryPolicy { payments_allowed: false, change_allowed: false }),
            ("CU".to_string(), CountryPolicy { payments_allowed: false, change_allowed: true }),
        ]),
        platform_minimums: HashMap::from([
            ("RUB".to_string(), Amount::from_major(1)),
            ("USD".to_string(), Amount::from_minor(50)),
            ("EUR".to_string(), Amount::from_minor(50)),
        ]),
        exchange_rates: vec![
            ExchangeRate { from: "RUB".into(), to: "USD".into(), rate_ppm: 15_385 },
            ExchangeRate { from: "USD".into(), to: "RUB".into(), rate_ppm: 65_000_000 },
            ExchangeRate { from: "KZT".into(), to: "RUB".into(), rate_ppm: 200_000 },
            ExchangeRate { from: "EUR".into(), to: "RUB".into(), rate_ppm: 70_000_000 },
        ],
        tax_rates: vec![
            TaxRate { country: "US".into(), subdivision: None, rate_ppm: 50_000 },
            TaxRate { country: "US".into(), subdivision: Some("CA".into()), rate_ppm: 100_000 },
        ],
        cost_schedules: vec![
            schedule("pm-card", "RU", "RUB", 25_000, 100),
            schedule("pm-card", "US", "USD", 29_000, 30),
            schedule("pm-wallet", "RU", "RUB", 30_000, 0),
        ],
        geo: HashMap::from([
            ("95.173.136.70".to_string(), geo("RU", "RU", Some("MOW"))),
            ("175.45.176.1".to_string(), geo("KP", "KP", None)),
            ("152.206.0.1".to_string(), geo("CU", "CU", None)),
            ("8.8.8.8".to_string(), geo("US", "US", Some("CA"))),
        ]),
    }
}

/// Wires every collaborator to the same in-memory catalog, with `provider` registered for the `cardpay` handler.
pub fn sample_services(catalog: Arc<MemoryCatalog>, provider: Arc<dyn PaymentProvider>) -> EngineServices {
    let mut providers = ProviderRegistry::default();
    providers.register(CARD_HANDLER, provider);
    EngineServices {
        catalog: catalog.clone(),
        geo: catalog.clone(),
        rates: catalog.clone(),
        tax: catalog.clone(),
        costs: catalog,
        providers,
    }
}

/// A 150 RUB card order for `proj-game`, as it would look straight after creation. Each id gets a distinct token.
pub fn sample_order(id: i64) -> Order {
    let project = sample_project();
    let new_order = NewOrder {
        uuid: OrderUuid::random(),
        project_order_id: Some(format!("game-{id}")),
        order_type: OrderType::Simple,
        project: OrderProject {
            id: project.id.clone(),
            merchant_id: project.merchant_id.clone(),
            name: project.name.clone(),
            url_success: project.url_success.clone(),
            url_fail: project.url_fail.clone(),
            url_notify: project.url_notify.clone(),
        },
        payment_method: Some(OrderPaymentMethod {
            id: "pm-card".into(),
            name: "Bank card".into(),
            group: "BANKCARD".into(),
            method_type: PaymentMethodType::BankCard,
            payment_system_id: "ps-card".into(),
            handler: CARD_HANDLER.into(),
            terminal_id: Some("T-100".into()),
            callback_secret: CARD_CALLBACK_SECRET.into(),
        }),
        user: OrderUser { country: Some("RU".into()), region: Some("RU".into()), ..Default::default() },
        billing_address: None,
        items: vec![],
        description: Some(format!("Order #{id}")),
        amount: Amount::from_major(150),
        currency: "RUB".into(),
        tax: Amount::default(),
        total_amount: Amount::from_major(150),
        user_address_data_required: false,
        form_expires_at: Utc::now() + Duration::minutes(30),
    };
    new_order.into_order(id, Utc::now())
}
