use shared::{
    error::{ApiError, ErrorCode},
    protocol::{
        CreateFilterRequest, DeletedFilter, FilterRecord, FilterUsage, FilterUsageEntry,
        FilterUsageStats,
    },
};
use storage::{
    is_unique_violation, normalize_filter_name, NewFilter, StoredFilter, MAX_DISPLAY_NAME_CHARS,
    MAX_FILTER_NAME_CHARS,
};
use tracing::info;

use crate::{internal, ApiContext};

pub fn filter_record(stored: StoredFilter) -> FilterRecord {
    FilterRecord {
        id: stored.id,
        name: stored.name,
        display_name: stored.display_name,
        description: stored.description,
        background_image: stored.background_image,
        icon: stored.icon,
        is_active: stored.is_active,
        sort_order: stored.sort_order,
        usage_count: stored.usage_count,
        last_used_at: stored.last_used_at,
        created_at: stored.created_at,
        updated_at: stored.updated_at,
    }
}

pub async fn list_filters(ctx: &ApiContext) -> Result<Vec<FilterRecord>, ApiError> {
    let filters = ctx.storage.list_active_filters().await.map_err(internal)?;
    Ok(filters.into_iter().map(filter_record).collect())
}

pub async fn get_filter(ctx: &ApiContext, name: &str) -> Result<FilterRecord, ApiError> {
    ctx.storage
        .find_by_name(name)
        .await
        .map_err(internal)?
        .map(filter_record)
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "filter not found"))
}

pub async fn create_filter(
    ctx: &ApiContext,
    req: CreateFilterRequest,
) -> Result<FilterRecord, ApiError> {
    let name = normalize_filter_name(&req.name);
    let display_name = req.display_name.trim();
    if name.is_empty() || display_name.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "name and display_name are required",
        ));
    }
    if name.chars().count() > MAX_FILTER_NAME_CHARS {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("name must be at most {MAX_FILTER_NAME_CHARS} characters"),
        ));
    }
    if display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("display_name must be at most {MAX_DISPLAY_NAME_CHARS} characters"),
        ));
    }

    if ctx
        .storage
        .find_by_name(&name)
        .await
        .map_err(internal)?
        .is_some()
    {
        return Err(ApiError::new(ErrorCode::Conflict, "filter name already exists"));
    }

    let created = ctx
        .storage
        .create_filter(&NewFilter {
            name,
            display_name: display_name.to_string(),
            description: req.description,
            background_image: req.background_image,
            icon: req.icon,
            is_active: req.is_active,
            sort_order: req.sort_order,
        })
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                ApiError::new(ErrorCode::Conflict, "filter name already exists")
            } else {
                internal(err)
            }
        })?;
    info!(name = %created.name, "filter created");
    Ok(filter_record(created))
}

pub async fn record_filter_use(ctx: &ApiContext, name: &str) -> Result<FilterUsage, ApiError> {
    let usage = ctx
        .storage
        .increment_usage(name)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "filter not found"))?;
    Ok(FilterUsage {
        name: usage.name,
        usage_count: usage.usage_count,
        last_used_at: usage.last_used_at,
    })
}

pub async fn delete_filter(ctx: &ApiContext, name: &str) -> Result<DeletedFilter, ApiError> {
    let name = normalize_filter_name(name);
    if !ctx.storage.delete_filter(&name).await.map_err(internal)? {
        return Err(ApiError::new(ErrorCode::NotFound, "filter not found"));
    }
    info!(name = %name, "filter deleted");
    Ok(DeletedFilter { name })
}

pub async fn filter_usage_stats(ctx: &ApiContext) -> Result<FilterUsageStats, ApiError> {
    let filters = ctx
        .storage
        .list_active_filters_by_usage()
        .await
        .map_err(internal)?;
    let total_usage: i64 = filters.iter().map(|f| f.usage_count).sum();

    let entries = filters
        .into_iter()
        .map(|f| FilterUsageEntry {
            usage_percentage: usage_percentage(f.usage_count, total_usage),
            name: f.name,
            display_name: f.display_name,
            usage_count: f.usage_count,
            last_used_at: f.last_used_at,
        })
        .collect::<Vec<_>>();

    Ok(FilterUsageStats {
        total_filters: entries.len(),
        total_usage,
        filters: entries,
    })
}

fn usage_percentage(count: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let raw = count as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}
