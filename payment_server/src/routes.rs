//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Every `/api` route answers with an [`ApiResponse`] envelope. Business and validation failures are a normal
//! response with a non-OK `status` in the envelope; only infrastructure failures become HTTP 5xx responses.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. For this reason, any long, non-cpu-bound operation (e.g. I/O,
//! database operations, etc.) should be expressed as futures or asynchronous functions.
use std::collections::BTreeMap;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use payment_engine::{
    db_types::OrderUuid,
    order_objects::{OrderCreateRequest, OrderView, PaymentCreateRequest, RequestSignature},
    traits::OrderManagement,
    OrderError,
    OrderFlowApi,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::ServerOptions,
    data_objects::{ApiResponse, ConfirmOrderParams, ReversalParams},
    errors::ServerError,
    helpers::{get_remote_ip, get_signature},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

/// Wraps the outcome of an engine call in the response envelope. System errors are the only ones that escape as
/// transport-level failures.
fn respond<T: Serialize>(result: Result<T, OrderError>) -> Result<HttpResponse, ServerError> {
    match result {
        Ok(item) => Ok(HttpResponse::Ok().json(ApiResponse::ok(item))),
        Err(e) if e.is_system_error() => {
            error!("💻️ Request failed with a system error. {e}");
            Err(e.into())
        },
        Err(e) => {
            debug!("💻️ Request refused [{}]. {e}", e.code());
            Ok(HttpResponse::Ok().json(ApiResponse::<()>::from_order_error(&e)))
        },
    }
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/order" impl OrderManagement);
/// Route handler for order creation from a JSON body.
///
/// Projects that only accept signed requests must send the hex HMAC of the exact body bytes in the `X-Signature`
/// header. If the request names neither an IP address nor a country for the payer, the caller's address is used.
pub async fn create_order<B: OrderManagement>(
    req: HttpRequest,
    body: web::Bytes,
    options: web::Data<ServerOptions>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received order creation request");
    let mut request = match serde_json::from_slice::<OrderCreateRequest>(&body) {
        Ok(r) => r,
        Err(e) => return respond::<()>(Err(OrderError::InvalidRequest(e.to_string()))),
    };
    fill_payer_ip(&req, &options, &mut request);
    let signature = RequestSignature::json(body.to_vec(), get_signature(&req));
    let result = api.create_order(request, Some(signature)).await.map(|o| OrderView::from(&o));
    respond(result)
}

route!(create_order_form => Post "/order/form" impl OrderManagement);
/// Route handler for order creation from URL-encoded form parameters. The `signature` parameter, when present, is
/// checked against the canonical form of the other parameters.
pub async fn create_order_form<B: OrderManagement>(
    req: HttpRequest,
    form: web::Form<BTreeMap<String, String>>,
    options: web::Data<ServerOptions>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received form order creation request");
    let params = form.into_inner();
    let mut request = match OrderCreateRequest::from_form(&params) {
        Ok(r) => r,
        Err(e) => return respond::<()>(Err(e)),
    };
    fill_payer_ip(&req, &options, &mut request);
    let result = api.create_order(request, Some(RequestSignature::form(params))).await.map(|o| OrderView::from(&o));
    respond(result)
}

fn fill_payer_ip(req: &HttpRequest, options: &ServerOptions, request: &mut OrderCreateRequest) {
    if request.user.ip.is_none() && request.user.country.is_none() {
        request.user.ip = get_remote_ip(req, options.use_x_forwarded_for, options.use_forwarded).map(|ip| ip.to_string());
    }
}

route!(order_by_uuid => Get "/order/{uuid}" impl OrderManagement);
pub async fn order_by_uuid<B: OrderManagement>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let uuid = OrderUuid(path.into_inner());
    trace!("💻️ GET order {uuid}");
    respond(api.order_by_uuid(&uuid).await)
}

route!(recreate_order => Post "/order/{uuid}/recreate" impl OrderManagement);
pub async fn recreate_order<B: OrderManagement>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let uuid = OrderUuid(path.into_inner());
    trace!("💻️ Re-create order {uuid}");
    respond(api.recreate_order(&uuid).await.map(|o| OrderView::from(&o)))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(create_payment => Post "/payment" impl OrderManagement);
pub async fn create_payment<B: OrderManagement>(
    body: web::Json<PaymentCreateRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    trace!("💻️ Payment form submitted for order {}", request.order_uuid);
    respond(api.process_payment(request).await)
}

route!(payment_callback => Post "/callback/{uuid}" impl OrderManagement);
/// Route handler for payment provider callbacks. The signature in `X-Signature` covers the raw body, so the body is
/// passed to the engine untouched.
pub async fn payment_callback<B: OrderManagement>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let uuid = OrderUuid(path.into_inner());
    trace!("💻️ Callback for order {uuid}");
    let signature = get_signature(&req).unwrap_or_default();
    let result = api.process_callback(&uuid, &body, &signature).await.map(|r| OrderView::from(r.order()));
    respond(result)
}

//----------------------------------------------   Merchant  ----------------------------------------------------
// The order token appears in payer-facing URLs, so every merchant route also requires the project's HMAC of the raw
// body in `X-Signature`. Unsigned or forged requests get a 403 envelope and the order is left alone.

/// Authenticates a merchant request and parses its JSON body.
async fn merchant_request<B, T>(
    req: &HttpRequest,
    uuid: &OrderUuid,
    body: &[u8],
    api: &OrderFlowApi<B>,
) -> Result<T, OrderError>
where
    B: OrderManagement,
    T: DeserializeOwned,
{
    api.authenticate_project_request(uuid, body, get_signature(req).as_deref()).await?;
    serde_json::from_slice(body).map_err(|e| OrderError::InvalidRequest(e.to_string()))
}

route!(confirm_order => Post "/order/{uuid}/confirm" impl OrderManagement);
pub async fn confirm_order<B: OrderManagement>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let uuid = OrderUuid(path.into_inner());
    trace!("💻️ Merchant confirmation for order {uuid}");
    let params = match merchant_request::<B, ConfirmOrderParams>(&req, &uuid, &body, &api).await {
        Ok(p) => p,
        Err(e) => return respond::<()>(Err(e)),
    };
    respond(api.confirm_by_project(&uuid, params.accepted).await.map(|o| OrderView::from(&o)))
}

route!(refund_order => Post "/order/{uuid}/refund" impl OrderManagement);
pub async fn refund_order<B: OrderManagement>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let uuid = OrderUuid(path.into_inner());
    trace!("💻️ Refund requested for order {uuid}");
    let params = match merchant_request::<B, ReversalParams>(&req, &uuid, &body, &api).await {
        Ok(p) => p,
        Err(e) => return respond::<()>(Err(e)),
    };
    respond(api.refund(&uuid, &params.reason).await.map(|o| OrderView::from(&o)))
}

route!(chargeback_order => Post "/order/{uuid}/chargeback" impl OrderManagement);
pub async fn chargeback_order<B: OrderManagement>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let uuid = OrderUuid(path.into_inner());
    trace!("💻️ Chargeback reported for order {uuid}");
    let params = match merchant_request::<B, ReversalParams>(&req, &uuid, &body, &api).await {
        Ok(p) => p,
        Err(e) => return respond::<()>(Err(e)),
    };
    respond(api.chargeback(&uuid, &params.reason).await.map(|o| OrderView::from(&o)))
}

route!(replace_item => Post "/order/{uuid}/replace" impl OrderManagement);
/// Item replacement takes no parameters. The signature then covers an empty body.
pub async fn replace_item<B: OrderManagement>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let uuid = OrderUuid(path.into_inner());
    trace!("💻️ Item replacement for order {uuid}");
    if let Err(e) = api.authenticate_project_request(&uuid, &body, get_signature(&req).as_deref()).await {
        return respond::<()>(Err(e));
    }
    respond(api.replace_item(&uuid).await.map(|o| OrderView::from(&o)))
}
