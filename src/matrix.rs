//! Availability matrix for the dashboard.
//!
//! Counts live slots by golf course × date × time bucket over a rolling
//! window starting today. The grid is dense: every course, date and bucket
//! has a cell, zero when nothing matches. The aggregator only reads, and
//! may serve a cached grid up to the configured cache TTL old.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, FixedOffset, NaiveDate};
use metrics::counter;
use moka::future::Cache;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::{MAX_MATRIX_WINDOW_DAYS, TeeSheetConfig};
use crate::domain::classify::{self, BookingCategory, TimeBucket};
use crate::domain::course::CourseId;
use crate::domain::slot::{SlotKind, SlotStatus};
use crate::error::{Result, TeeTimeError};
use crate::storage::{SlotFilter, Storage};

/// One row of the grid: a course and bucket, with a count per date column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixRow {
    pub course_id: CourseId,
    pub course_name: String,
    pub region_name: String,
    pub time_bucket: TimeBucket,
    /// Parallel to [`SlotMatrix::date_columns`]
    pub counts: Vec<u32>,
}

/// A single (course, date, bucket) count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatrixCell {
    pub course_id: CourseId,
    pub date: NaiveDate,
    pub time_bucket: TimeBucket,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotMatrix {
    pub date_columns: Vec<NaiveDate>,
    /// Courses in dashboard order, each followed by its three buckets
    pub rows: Vec<MatrixRow>,
}

impl SlotMatrix {
    /// Every cell of the grid, row by row.
    pub fn cells(&self) -> impl Iterator<Item = MatrixCell> + '_ {
        self.rows.iter().flat_map(move |row| {
            self.date_columns
                .iter()
                .zip(&row.counts)
                .map(move |(date, count)| MatrixCell {
                    course_id: row.course_id,
                    date: *date,
                    time_bucket: row.time_bucket,
                    count: *count,
                })
        })
    }

    pub fn count(&self, course_id: CourseId, date: NaiveDate, bucket: TimeBucket) -> Option<u32> {
        let column = self.date_columns.iter().position(|d| *d == date)?;
        self.rows
            .iter()
            .find(|row| row.course_id == course_id && row.time_bucket == bucket)
            .map(|row| row.counts[column])
    }

    pub fn total(&self) -> u64 {
        self.rows
            .iter()
            .flat_map(|row| row.counts.iter())
            .map(|count| u64::from(*count))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MatrixKey {
    category: BookingCategory,
    kind: Option<SlotKind>,
    window_days: u32,
    today: NaiveDate,
}

pub struct MatrixAggregator<S: Storage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    cache: Option<Cache<MatrixKey, Arc<SlotMatrix>>>,
}

impl<S: Storage> MatrixAggregator<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>, config: &TeeSheetConfig) -> Result<Self> {
        let cache = (config.matrix_cache_ttl_ms > 0).then(|| {
            Cache::builder()
                .max_capacity(config.matrix_cache_capacity)
                .time_to_live(Duration::from_millis(config.matrix_cache_ttl_ms))
                .build()
        });

        Ok(Self {
            storage,
            clock,
            offset: config.utc_offset()?,
            cache,
        })
    }

    /// Build (or fetch from cache) the grid for `[today, today + window_days)`.
    ///
    /// Counts slots of the given category, optionally restricted to one slot
    /// kind, that are Available, Held or Confirmed.
    #[tracing::instrument(skip(self), fields(category = category.as_str()))]
    pub async fn build_matrix(
        &self,
        category: BookingCategory,
        kind: Option<SlotKind>,
        window_days: u32,
    ) -> Result<Arc<SlotMatrix>> {
        if !(1..=MAX_MATRIX_WINDOW_DAYS).contains(&window_days) {
            return Err(TeeTimeError::InvalidInput(format!(
                "window_days must be within 1..={MAX_MATRIX_WINDOW_DAYS}, got {window_days}"
            )));
        }

        let key = MatrixKey {
            category,
            kind,
            window_days,
            today: classify::local_today(self.clock.now(), self.offset),
        };

        let Some(cache) = &self.cache else {
            counter!("teesheet_matrix_builds_total", "cache" => "disabled").increment(1);
            return Ok(Arc::new(self.aggregate(&key).await?));
        };

        if let Some(matrix) = cache.get(&key).await {
            counter!("teesheet_matrix_builds_total", "cache" => "hit").increment(1);
            return Ok(matrix);
        }

        counter!("teesheet_matrix_builds_total", "cache" => "miss").increment(1);
        let matrix = Arc::new(self.aggregate(&key).await?);
        cache.insert(key, matrix.clone()).await;
        Ok(matrix)
    }

    /// Drop every cached grid.
    pub fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    async fn aggregate(&self, key: &MatrixKey) -> Result<SlotMatrix> {
        let until = key
            .today
            .checked_add_days(Days::new(u64::from(key.window_days)))
            .ok_or_else(|| TeeTimeError::InvalidInput("matrix window out of range".to_string()))?;

        let date_columns: Vec<NaiveDate> = key
            .today
            .iter_days()
            .take_while(|d| *d < until)
            .collect();
        let courses = self.storage.list_courses().await?;

        let mut rows = Vec::with_capacity(courses.len() * TimeBucket::ALL.len());
        let mut row_base = HashMap::with_capacity(courses.len());
        for course in &courses {
            row_base.insert(course.id, rows.len());
            for bucket in TimeBucket::ALL {
                rows.push(MatrixRow {
                    course_id: course.id,
                    course_name: course.name.clone(),
                    region_name: course.region_name.clone(),
                    time_bucket: bucket,
                    counts: vec![0; date_columns.len()],
                });
            }
        }

        let filter = SlotFilter::default()
            .with_statuses(SlotStatus::LIVE)
            .with_dates(Some(key.today), Some(until))
            .with_category(key.category)
            .with_kind(key.kind);
        let slots = self.storage.query_slots(&filter).await?;

        for slot in &slots {
            let data = slot.data();
            let Some(base) = row_base.get(&data.course_id) else {
                tracing::debug!(
                    slot_id = %data.id,
                    course_id = %data.course_id,
                    "Slot on unknown course, not counted"
                );
                continue;
            };
            let column = (data.date - key.today).num_days();
            if let Ok(column) = usize::try_from(column)
                && column < date_columns.len()
            {
                rows[base + data.time_bucket.index()].counts[column] += 1;
            }
        }

        tracing::debug!(
            courses = courses.len(),
            days = date_columns.len(),
            slots = slots.len(),
            "Matrix aggregated"
        );

        Ok(SlotMatrix { date_columns, rows })
    }
}
