mod assignments;
mod item_types;
mod samples;
mod sessions;
