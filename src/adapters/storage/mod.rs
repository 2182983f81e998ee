//! Storage Adapters
//!
//! Implementations of the `ConversationRepository` port.
//!
//! ## Available Adapters
//!
//! - **InMemoryConversationRepository** - memory only (testing/development)
//! - **PostgresConversationRepository** - see `adapters::postgres`

mod in_memory_conversation_repository;

pub use in_memory_conversation_repository::InMemoryConversationRepository;
