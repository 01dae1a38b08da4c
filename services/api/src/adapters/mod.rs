pub mod chat_llm;
pub mod db;
pub mod plan_llm;

pub use chat_llm::OpenAiChatAdapter;
pub use db::DbAdapter;
pub use plan_llm::OpenAiPlanAdapter;
