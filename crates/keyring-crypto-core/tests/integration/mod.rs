mod collection_unlock;
mod key_export;
