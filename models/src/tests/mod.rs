mod history;
mod kind;
