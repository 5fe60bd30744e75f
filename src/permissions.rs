//! Permission resolution
//!
//! An actor's effective level combines the global base level, levels
//! derived from the actor's roles, and explicit per-guild overrides. An
//! override beats the role-derived level when both exist. Denial is a
//! normal negative result, not an error.
//!
//! Role sets come from the member-directory collaborator behind
//! [`RoleSource`]; resolved levels are cached with a short TTL and must
//! be invalidated when the role-change collaborator reports a mutation.

use crate::cache::{CacheError, TtlCache};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;

/// Supplies an actor's current role set for a guild.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleSource: Send + Sync {
    async fn member_roles(&self, guild_id: u64, actor_id: u64) -> Result<Vec<u64>, crate::Error>;
}

/// Per-guild permission data: role-derived levels and per-actor overrides.
#[derive(Debug, Clone, Default)]
pub struct GuildAccess {
    /// role id -> permission level granted by holding the role
    pub role_levels: HashMap<u64, u8>,
    /// actor id -> explicit level, beating any role-derived level
    pub overrides: HashMap<u64, u8>,
}

/// Result of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Authorized { effective: u8 },
    Denied { effective: u8, required: u8 },
}

/// Resolves and caches effective permission levels.
pub struct PermissionResolver {
    base_level: u8,
    guilds: DashMap<u64, GuildAccess>,
    roles: Arc<dyn RoleSource>,
    cache: TtlCache<(u64, u64), u8>,
    ttl: Duration,
}

impl PermissionResolver {
    pub fn new(base_level: u8, roles: Arc<dyn RoleSource>, ttl: Duration) -> Self {
        Self {
            base_level,
            guilds: DashMap::new(),
            roles,
            cache: TtlCache::new(),
            ttl,
        }
    }

    /// Install or replace the whole permission table for a guild.
    pub fn configure_guild(&self, guild_id: u64, access: GuildAccess) {
        self.guilds.insert(guild_id, access);
        self.invalidate_guild(guild_id);
    }

    /// Role-change collaborator entry point: a role's granted level
    /// changed, so every cached level in the guild is suspect.
    pub fn set_role_level(&self, guild_id: u64, role_id: u64, level: u8) {
        self.guilds
            .entry(guild_id)
            .or_default()
            .role_levels
            .insert(role_id, level);
        self.invalidate_guild(guild_id);
    }

    pub fn clear_role_level(&self, guild_id: u64, role_id: u64) {
        if let Some(mut access) = self.guilds.get_mut(&guild_id) {
            access.role_levels.remove(&role_id);
        }
        self.invalidate_guild(guild_id);
    }

    /// Role-change collaborator entry point: per-actor override mutation.
    pub fn set_override(&self, guild_id: u64, actor_id: u64, level: u8) {
        self.guilds
            .entry(guild_id)
            .or_default()
            .overrides
            .insert(actor_id, level);
        self.invalidate(actor_id, guild_id);
    }

    pub fn clear_override(&self, guild_id: u64, actor_id: u64) {
        if let Some(mut access) = self.guilds.get_mut(&guild_id) {
            access.overrides.remove(&actor_id);
        }
        self.invalidate(actor_id, guild_id);
    }

    /// Drop the cached level for one (actor, guild) pair.
    pub fn invalidate(&self, actor_id: u64, guild_id: u64) {
        self.cache.invalidate(&(actor_id, guild_id));
    }

    /// Drop every cached level for a guild.
    pub fn invalidate_guild(&self, guild_id: u64) {
        self.cache.invalidate_where(|(_, guild)| *guild == guild_id);
    }

    /// The actor's effective level in the guild, cache-assisted.
    ///
    /// # Errors
    /// Fails only when the role lookup itself fails; a guild with no
    /// configured roles resolves to the base level without one.
    pub async fn effective_level(&self, actor_id: u64, guild_id: u64) -> Result<u8, CacheError> {
        self.cache
            .get_or_compute((actor_id, guild_id), self.ttl, || {
                self.compute_level(actor_id, guild_id)
            })
            .await
    }

    /// Check the actor against a required level.
    ///
    /// # Errors
    /// See [`Self::effective_level`]; denial is a [`Decision`], never an
    /// error.
    pub async fn authorize(
        &self,
        actor_id: u64,
        guild_id: u64,
        required: u8,
    ) -> Result<Decision, CacheError> {
        let effective = self.effective_level(actor_id, guild_id).await?;
        if effective >= required {
            Ok(Decision::Authorized { effective })
        } else {
            Ok(Decision::Denied {
                effective,
                required,
            })
        }
    }

    async fn compute_level(&self, actor_id: u64, guild_id: u64) -> Result<u8, crate::Error> {
        // Clone out of the map so no shard lock is held across the
        // role lookup await.
        let Some(access) = self.guilds.get(&guild_id).map(|entry| entry.value().clone()) else {
            return Ok(self.base_level);
        };

        if let Some(&level) = access.overrides.get(&actor_id) {
            return Ok(self.base_level.max(level));
        }

        if access.role_levels.is_empty() {
            return Ok(self.base_level);
        }

        let roles = self.roles.member_roles(guild_id, actor_id).await?;
        let derived = roles
            .iter()
            .filter_map(|role| access.role_levels.get(role).copied())
            .max()
            .unwrap_or(0);
        Ok(self.base_level.max(derived))
    }
}
