pub mod company;
pub mod contact;
pub mod pipeline_state;
pub mod search;
