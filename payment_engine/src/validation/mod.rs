//! # Order request validation
//!
//! An order request passes through a fixed list of [`Stage`]s, in the order given by [`PIPELINE`]. Each stage reads
//! the [`CheckedContext`] produced by the previous one and either returns an enriched context or fails. The first
//! failure ends the run and is returned unchanged; later stages never see a request that an earlier one rejected.
//!
//! When every stage has passed, [`OrderPipeline::assemble`] builds the order from the context and stores it.
mod context;

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
pub use context::CheckedContext;
use log::*;
use pg_common::Amount;

use crate::{
    catalog::AmountLimits,
    db_types::{NewOrder, Order, OrderItem, OrderUser, OrderUuid},
    helpers::{canonical_form, verify_hmac, SignatureError},
    pg_api::{
        errors::OrderError,
        order_objects::{OrderCreateRequest, RequestSignature, SignedPayload},
        services::{EngineConfig, EngineServices},
    },
    traits::OrderManagement,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Project,
    Currency,
    UserGeo,
    CountryRestriction,
    Products,
    DuplicateOrderId,
    PaymentMethod,
    AmountLimits,
    PlatformMinimum,
    Signature,
    UrlPolicy,
}

pub const PIPELINE: [Stage; 11] = [
    Stage::Project,
    Stage::Currency,
    Stage::UserGeo,
    Stage::CountryRestriction,
    Stage::Products,
    Stage::DuplicateOrderId,
    Stage::PaymentMethod,
    Stage::AmountLimits,
    Stage::PlatformMinimum,
    Stage::Signature,
    Stage::UrlPolicy,
];

pub struct OrderPipeline<'a, B> {
    db: &'a B,
    services: &'a EngineServices,
    config: &'a EngineConfig,
}

impl<'a, B> OrderPipeline<'a, B>
where B: OrderManagement
{
    pub fn new(db: &'a B, services: &'a EngineServices, config: &'a EngineConfig) -> Self {
        Self { db, services, config }
    }

    /// Runs every stage and stores the resulting order.
    pub async fn run(
        &self,
        request: OrderCreateRequest,
        signature: Option<RequestSignature>,
    ) -> Result<Order, OrderError> {
        let ctx = self.check(request, signature).await?;
        self.assemble(ctx).await
    }

    /// Runs every stage without storing anything.
    pub async fn check(
        &self,
        request: OrderCreateRequest,
        signature: Option<RequestSignature>,
    ) -> Result<CheckedContext, OrderError> {
        let mut ctx = CheckedContext::new(request, signature);
        for stage in PIPELINE {
            ctx = self.run_stage(stage, ctx).await.map_err(|e| {
                debug!("🧾️ Order request rejected at the {stage:?} stage: {e}");
                e
            })?;
        }
        Ok(ctx)
    }

    async fn run_stage(&self, stage: Stage, ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
        trace!("🧾️ Running the {stage:?} stage");
        match stage {
            Stage::Project => self.resolve_project(ctx).await,
            Stage::Currency => self.resolve_currency(ctx).await,
            Stage::UserGeo => self.resolve_user(ctx).await,
            Stage::CountryRestriction => self.check_country(ctx).await,
            Stage::Products => self.resolve_products(ctx).await,
            Stage::DuplicateOrderId => self.check_duplicate(ctx).await,
            Stage::PaymentMethod => self.bind_payment_method(ctx).await,
            Stage::AmountLimits => self.check_limits(ctx).await,
            Stage::PlatformMinimum => self.check_platform_minimum(ctx).await,
            Stage::Signature => check_signature(ctx),
            Stage::UrlPolicy => check_url_policy(ctx),
        }
    }

    async fn resolve_project(&self, mut ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
        let catalog = &self.services.catalog;
        let project =
            catalog.fetch_project(&ctx.request.project_id).await?.ok_or(OrderError::ProjectNotFound)?;
        if !project.is_accepting_orders() {
            return Err(OrderError::ProjectInactive);
        }
        let merchant = catalog
            .fetch_merchant(&project.merchant_id)
            .await?
            .ok_or_else(|| OrderError::Collaborator(format!("Merchant {} is not configured", project.merchant_id)))?;
        ctx.project = Some(project);
        ctx.merchant = Some(merchant);
        Ok(ctx)
    }

    async fn resolve_currency(&self, mut ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
        let project = ctx.project()?;
        let currency = match ctx.request.currency.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => {
                let c = c.to_uppercase();
                if !self.services.catalog.is_supported_currency(&c).await? {
                    return Err(OrderError::CurrencyNotFound(c));
                }
                Some(c)
            },
            None if project.currency_required => return Err(OrderError::CurrencyIsRequired),
            None => match (&project.default_currency, ctx.request.order_type.has_line_items()) {
                (Some(c), _) => Some(c.clone()),
                // Product orders can still settle on a currency the products have in common
                (None, true) => None,
                (None, false) => return Err(OrderError::CurrencyIsRequired),
            },
        };
        ctx.currency = currency;
        Ok(ctx)
    }

    async fn resolve_user(&self, mut ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
        let req = &ctx.request.user;
        let mut user = OrderUser {
            external_id: req.external_id.clone(),
            email: req.email.clone(),
            phone: req.phone.clone(),
            ip: req.ip.clone(),
            locale: req.locale.clone(),
            ..Default::default()
        };
        match req.ip.as_deref() {
            Some(ip) => {
                let location = self.services.geo.resolve(ip).await.map_err(|e| {
                    warn!("🧾️ Could not locate payer IP {ip}: {e}");
                    OrderError::PayerRegionUnknown
                })?;
                user.country = Some(location.country);
                user.region = Some(location.region);
                user.subdivision = location.subdivision;
            },
            None => {
                user.country = req.country.clone();
                user.region = req.country.clone();
            },
        }
        ctx.user = user;
        Ok(ctx)
    }

    async fn check_country(&self, mut ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
        let Some(country) = ctx.user.country.as_deref() else {
            return Ok(ctx);
        };
        let policy = self.services.catalog.country_policy(country).await?.unwrap_or_default();
        if !policy.payments_allowed {
            if !policy.change_allowed {
                return Err(OrderError::CountryPaymentsNotAllowed);
            }
            debug!("🧾️ Payments from {country} are restricted. The payer must supply another billing country");
            ctx.user_address_data_required = true;
        }
        Ok(ctx)
    }

    async fn resolve_products(&self, mut ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
        if !ctx.request.order_type.has_line_items() {
            let amount = ctx.request.amount.ok_or(OrderError::AmountInvalid)?;
            if !amount.is_positive() {
                return Err(OrderError::AmountInvalid);
            }
            ctx.amount = Some(amount);
            return Ok(ctx);
        }
        let ids = &ctx.request.products;
        if ids.is_empty() {
            return Err(OrderError::ProductsEmpty);
        }
        let unique = ids.iter().collect::<BTreeSet<_>>();
        let project_id = &ctx.project()?.id;
        let products = self.services.catalog.fetch_products(project_id, ids).await?;
        if products.len() != unique.len() || products.iter().any(|p| !p.enabled) {
            return Err(OrderError::ProductsInvalid);
        }
        let mut common: Option<BTreeSet<&str>> = None;
        for product in &products {
            let currencies = product.prices.iter().map(|p| p.currency.as_str()).collect::<BTreeSet<_>>();
            common = Some(match common {
                None => currencies,
                Some(c) => c.intersection(&currencies).copied().collect(),
            });
        }
        let common = common.unwrap_or_default();
        let requested = ctx.request.currency.as_deref().map(str::trim).filter(|c| !c.is_empty()).is_some();
        if requested {
            // An explicitly requested currency is never swapped for another one
            if let Some(c) = ctx.currency.as_deref().filter(|c| !common.contains(c)) {
                debug!("🧾️ The requested products are not all priced in {c}");
                return Err(OrderError::NoProductsCommonCurrency);
            }
        }
        let project_default = ctx.project()?.default_currency.as_deref();
        let currency = ctx
            .currency
            .as_deref()
            .filter(|c| common.contains(c))
            .or_else(|| project_default.filter(|c| common.contains(c)))
            .or_else(|| common.iter().next().copied())
            .map(String::from)
            .ok_or(OrderError::NoProductsCommonCurrency)?;
        let mut prices = HashMap::new();
        for product in &products {
            let price = product.price_in(&currency).ok_or(OrderError::NoProductsCommonCurrency)?;
            prices.insert(product.id.as_str(), price);
        }
        let items = ids
            .iter()
            .filter_map(|id| products.iter().find(|p| &p.id == id))
            .map(|p| OrderItem {
                product_id: p.id.clone(),
                name: p.name.clone(),
                sku: p.sku.clone(),
                amount: prices.get(p.id.as_str()).copied().unwrap_or_default(),
                currency: currency.clone(),
            })
            .collect::<Vec<_>>();
        let amount = items.iter().map(|i| i.amount).sum::<Amount>();
        if !amount.is_positive() {
            return Err(OrderError::AmountInvalid);
        }
        if ctx.currency.as_deref() != Some(currency.as_str()) {
            debug!("🧾️ Settling product order in {currency}, the currency its products have in common");
        }
        ctx.currency = Some(currency);
        ctx.items = items;
        ctx.amount = Some(amount);
        Ok(ctx)
    }

    async fn check_duplicate(&self, ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
        if let Some(project_order_id) = ctx.request.project_order_id.as_deref() {
            let project_id = &ctx.project()?.id;
            if self.db.project_order_exists(project_id, project_order_id).await? {
                return Err(OrderError::DuplicateOrder);
            }
        }
        Ok(ctx)
    }

    async fn bind_payment_method(&self, mut ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
        let Some(group) = ctx.request.payment_method.as_deref() else {
            return Ok(ctx);
        };
        let catalog = &self.services.catalog;
        let method =
            catalog.find_payment_method(group, ctx.currency()?).await?.ok_or(OrderError::PaymentMethodNotFound)?;
        if !method.active {
            return Err(OrderError::PaymentMethodInactive);
        }
        let system = catalog
            .fetch_payment_system(&method.payment_system_id)
            .await?
            .filter(|s| s.active)
            .ok_or(OrderError::PaymentSystemInactive)?;
        ctx.payment_method = Some((method, system));
        Ok(ctx)
    }

    async fn check_limits(&self, ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
        let amount = ctx.amount()?;
        let currency = ctx.currency()?;
        if let Some(limits) = ctx.payment_method.as_ref().and_then(|(m, _)| m.limits.as_ref()) {
            match self.compare_with_limits(amount, currency, limits).await? {
                LimitCheck::BelowMin(min) => return Err(OrderError::MethodMinAmount(min)),
                LimitCheck::AboveMax(max) => return Err(OrderError::MethodMaxAmount(max)),
                LimitCheck::Within => {},
            }
        }
        if let Some(limits) = ctx.project()?.limits.as_ref() {
            match self.compare_with_limits(amount, currency, limits).await? {
                LimitCheck::BelowMin(min) => return Err(OrderError::ProjectMinAmount(min)),
                LimitCheck::AboveMax(max) => return Err(OrderError::ProjectMaxAmount(max)),
                LimitCheck::Within => {},
            }
        }
        Ok(ctx)
    }

    async fn compare_with_limits(
        &self,
        amount: Amount,
        currency: &str,
        limits: &AmountLimits,
    ) -> Result<LimitCheck, OrderError> {
        let amount = self.services.rates.convert(amount, currency, &limits.currency).await?;
        if let Some(min) = limits.min.filter(|min| amount < *min) {
            return Ok(LimitCheck::BelowMin(min));
        }
        if let Some(max) = limits.max.filter(|max| amount > *max) {
            return Ok(LimitCheck::AboveMax(max));
        }
        Ok(LimitCheck::Within)
    }

    async fn check_platform_minimum(&self, ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
        let currency = ctx.currency()?;
        let minimum = self
            .services
            .catalog
            .platform_minimum(currency)
            .await?
            .ok_or_else(|| OrderError::MinimumAmountNotConfigured(currency.to_string()))?;
        if ctx.amount()? < minimum {
            return Err(OrderError::AmountLowerThanMinAllowed(minimum));
        }
        Ok(ctx)
    }

    /// Builds the order from a fully checked context and stores it.
    pub async fn assemble(&self, ctx: CheckedContext) -> Result<Order, OrderError> {
        let project = ctx.project()?;
        let currency = ctx.currency()?.to_string();
        let amount = ctx.amount()?;
        let tax = match ctx.user.country.as_deref() {
            Some(country) => {
                self.services.tax.tax_for(amount, &currency, country, ctx.user.subdivision.as_deref()).await?
            },
            None => Amount::default(),
        };
        let mut snapshot = project.snapshot();
        if project.allow_dynamic_redirect_urls {
            snapshot.url_success = ctx.request.url_success.clone().or(snapshot.url_success);
            snapshot.url_fail = ctx.request.url_fail.clone().or(snapshot.url_fail);
        }
        if project.allow_dynamic_notify_urls {
            snapshot.url_notify = ctx.request.url_notify.clone().or(snapshot.url_notify);
        }
        let lifetime = chrono::Duration::from_std(self.config.order_form_lifetime)
            .map_err(|e| OrderError::Internal(format!("Invalid order form lifetime: {e}")))?;
        let order = NewOrder {
            uuid: OrderUuid::random(),
            project_order_id: ctx.request.project_order_id.clone(),
            order_type: ctx.request.order_type,
            project: snapshot,
            payment_method: ctx.payment_method.as_ref().map(|(m, s)| m.snapshot(s)),
            user: ctx.user.clone(),
            billing_address: None,
            items: ctx.items.clone(),
            description: ctx.request.description.clone(),
            amount,
            currency,
            tax,
            total_amount: amount + tax,
            user_address_data_required: ctx.user_address_data_required,
            form_expires_at: Utc::now() + lifetime,
        };
        let order = self.db.insert_order(order).await?;
        info!("🧾️ Order {} created for project {} ({} {})", order.uuid, order.project.id, order.total_amount, order.currency);
        Ok(order)
    }
}

enum LimitCheck {
    Within,
    BelowMin(Amount),
    AboveMax(Amount),
}

fn check_signature(ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
    let project = ctx.project()?;
    let supplied = ctx.signature.as_ref().and_then(|s| s.signature.as_deref()).is_some();
    if !project.signed_requests && !supplied {
        return Ok(ctx);
    }
    let Some(sig) = ctx.signature.as_ref() else {
        return Err(OrderError::SignatureRequired);
    };
    let signature = sig.signature.as_deref().ok_or(OrderError::SignatureRequired)?;
    let secret = project.secret_key.reveal();
    let result = match &sig.payload {
        SignedPayload::JsonBody(body) => verify_hmac(body, secret, signature),
        SignedPayload::FormParams(params) => verify_hmac(canonical_form(params).as_bytes(), secret, signature),
    };
    match result {
        Ok(()) => Ok(ctx),
        Err(SignatureError::Missing) => Err(OrderError::SignatureRequired),
        Err(e) => {
            warn!("🧾️ Rejecting order request for project {}: {e}", project.id);
            Err(OrderError::InvalidSignature)
        },
    }
}

fn check_url_policy(ctx: CheckedContext) -> Result<CheckedContext, OrderError> {
    let project = ctx.project()?;
    if ctx.request.has_dynamic_redirect_urls() && !project.allow_dynamic_redirect_urls {
        return Err(OrderError::DynamicRedirectUrlsNotAllowed);
    }
    if ctx.request.url_notify.is_some() && !project.allow_dynamic_notify_urls {
        return Err(OrderError::DynamicNotifyUrlsNotAllowed);
    }
    Ok(ctx)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        helpers::calculate_hmac,
        test_utils::fixtures::{sample_project, signed_project},
    };

    fn ctx_for(project: crate::catalog::Project, signature: Option<RequestSignature>) -> CheckedContext {
        let mut ctx = CheckedContext::new(OrderCreateRequest::default(), signature);
        ctx.project = Some(project);
        ctx
    }

    #[test]
    fn pipeline_order_is_fixed() {
        assert_eq!(PIPELINE.first(), Some(&Stage::Project));
        assert_eq!(PIPELINE.last(), Some(&Stage::UrlPolicy));
        let products = PIPELINE.iter().position(|s| *s == Stage::Products).unwrap();
        let duplicate = PIPELINE.iter().position(|s| *s == Stage::DuplicateOrderId).unwrap();
        let limits = PIPELINE.iter().position(|s| *s == Stage::AmountLimits).unwrap();
        assert!(products < duplicate && duplicate < limits);
    }

    #[test]
    fn unsigned_requests_pass_for_unsigned_projects() {
        assert!(check_signature(ctx_for(sample_project(), None)).is_ok());
    }

    #[test]
    fn signed_projects_require_a_signature() {
        let err = check_signature(ctx_for(signed_project(), None)).unwrap_err();
        assert!(matches!(err, OrderError::SignatureRequired));
        let sig = RequestSignature::json(b"{}".to_vec(), None);
        let err = check_signature(ctx_for(signed_project(), Some(sig))).unwrap_err();
        assert!(matches!(err, OrderError::SignatureRequired));
    }

    #[test]
    fn json_signatures() {
        let body = br#"{"project_id":"proj-signed","amount":100.0}"#.to_vec();
        let good = calculate_hmac(&body, "signed-secret").unwrap();
        let sig = RequestSignature::json(body.clone(), Some(good.clone()));
        assert!(check_signature(ctx_for(signed_project(), Some(sig))).is_ok());

        let mut tampered = body.clone();
        tampered[5] = b'X';
        let sig = RequestSignature::json(tampered, Some(good));
        assert!(matches!(check_signature(ctx_for(signed_project(), Some(sig))), Err(OrderError::InvalidSignature)));
    }

    #[test]
    fn a_supplied_signature_is_always_checked() {
        let sig = RequestSignature::json(b"{}".to_vec(), Some("00".repeat(64)));
        let err = check_signature(ctx_for(sample_project(), Some(sig))).unwrap_err();
        assert!(matches!(err, OrderError::InvalidSignature));
    }

    #[test]
    fn form_signatures() {
        let mut params = std::collections::BTreeMap::new();
        params.insert("project".to_string(), "proj-signed".to_string());
        params.insert("amount".to_string(), "100".to_string());
        let sig = calculate_hmac(canonical_form(&params).as_bytes(), "signed-secret").unwrap();
        params.insert("signature".to_string(), sig);
        let ctx = ctx_for(signed_project(), Some(RequestSignature::form(params)));
        assert!(check_signature(ctx).is_ok());
    }

    #[test]
    fn dynamic_urls_need_permission() {
        let mut ctx = ctx_for(sample_project(), None);
        ctx.request.url_success = Some("https://evil.example/ok".into());
        assert!(matches!(check_url_policy(ctx), Err(OrderError::DynamicRedirectUrlsNotAllowed)));

        let mut ctx = ctx_for(sample_project(), None);
        ctx.request.url_notify = Some("https://evil.example/hook".into());
        assert!(matches!(check_url_policy(ctx), Err(OrderError::DynamicNotifyUrlsNotAllowed)));

        let mut project = sample_project();
        project.allow_dynamic_redirect_urls = true;
        let mut ctx = ctx_for(project, None);
        ctx.request.url_fail = Some("https://shop.example/fail".into());
        assert!(check_url_policy(ctx).is_ok());
    }
}
