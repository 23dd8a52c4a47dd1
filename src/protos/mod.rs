//! Protocol messages exchanged with the native services
//!
//! Messages mirror the tracking server's proto2 definitions field for field and tag for tag.
//! Each request type is named after the endpoint it calls; its response is `<Request>Response`.

/// Bind request types to the endpoint they call
macro_rules! endpoints {
    ($service:expr => { $($request:ident => $response:ty),* $(,)? }) => {
        $(
            impl $crate::proxy::Endpoint for $request {
                type Response = $response;
                const SERVICE: $crate::service::ServiceKind = $service;
                const NAME: &'static str = stringify!($request);
            }
        )*
    };
}

/// Messages without fields
macro_rules! empty_messages {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct $name {}
        )*
    };
}

pub mod model_registry;
pub mod tracking;
