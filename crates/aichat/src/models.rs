//! These models represent the objects passed around by the chat service
//!
//! There are two related formats we need to interact with:
//! - ui messages, where the role is a boolean flag, sent from the browser to the server
//! - openai messages, sent from the server to the LLM
//!
//! We always immediately convert the ui format into the internal [message::Message]
//! before it reaches a provider, and back again once a reply arrives.
pub mod chat;
pub mod message;
pub mod role;
