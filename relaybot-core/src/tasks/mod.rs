pub mod cooldown_prune;
