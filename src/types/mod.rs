pub use self::{
    push::{
        channel_name, AuthMessage, PushEvent, PushTarget, SubscribeMessage,
    },
    query::{ParamValue, QueryParams, RawPayload, TimeRange},
};

mod push;
mod query;
