pub mod send;

pub use send::{
    JsonSendPayload, SendForm, SendRequest, SendResponse, SendResult, SendStatus, SenderAccount,
    StoredAttachment,
};
