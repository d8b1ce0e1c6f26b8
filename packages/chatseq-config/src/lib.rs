mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Indexing, Limits, Postgres, Qdrant, Reconcile, Redis, Search, Sequence, Service,
	Storage, Worker,
};

use std::{fs, net::SocketAddr, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.qdrant.url", &cfg.storage.qdrant.url),
		("storage.qdrant.collection", &cfg.storage.qdrant.collection),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	let admin_addr: SocketAddr = cfg.service.admin_bind.parse().map_err(|_| Error::Validation {
		message: "service.admin_bind must be a socket address.".to_string(),
	})?;

	if !admin_addr.ip().is_loopback() {
		return Err(Error::Validation {
			message: "service.admin_bind must be a loopback address.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.redis.op_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "storage.redis.op_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.reconcile.delay_seconds == 0 {
		return Err(Error::Validation {
			message: "reconcile.delay_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.reconcile.sweep_interval_seconds == 0 {
		return Err(Error::Validation {
			message: "reconcile.sweep_interval_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.reconcile.max_attempts == 0 {
		return Err(Error::Validation {
			message: "reconcile.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.indexing.max_attempts == 0 {
		return Err(Error::Validation {
			message: "indexing.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.concurrency == 0 {
		return Err(Error::Validation {
			message: "worker.concurrency must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "worker.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.lease_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.base_backoff_ms <= 0 {
		return Err(Error::Validation {
			message: "worker.base_backoff_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.base_backoff_ms > cfg.worker.max_backoff_ms {
		return Err(Error::Validation {
			message: "worker.base_backoff_ms must not exceed worker.max_backoff_ms.".to_string(),
		});
	}
	if cfg.search.max_results == 0 {
		return Err(Error::Validation {
			message: "search.max_results must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("limits.max_body_chars", cfg.limits.max_body_chars),
		("limits.max_name_chars", cfg.limits.max_name_chars),
		("limits.max_per_page", cfg.limits.max_per_page),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.storage.redis.url.as_deref().map(|url| url.trim().is_empty()).unwrap_or(false) {
		cfg.storage.redis.url = None;
	}
}
