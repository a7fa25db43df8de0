pub mod chat_area;
pub mod entrance;
pub mod input_bar;
pub mod launcher;
