//! PostgreSQL implementation of [`Storage`].
//!
//! The conditional update is a single `UPDATE ... WHERE id = $1 AND status =
//! $2 AND version = $3`: Postgres row locking makes it the one place racing
//! callers are ordered, across any number of service instances.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, QueryBuilder, Row};
use uuid::Uuid;

pub mod pool_provider;

pub use pool_provider::{PoolProvider, TestDbPools};

use super::{SlotFilter, Storage, UpdateOutcome};
use crate::domain::capability::{Actor, TeamId, UserId};
use crate::domain::course::{CourseId, GolfCourse};
use crate::domain::package::{PackageLink, PackageLinkId};
use crate::domain::slot::{
    AnySlot, Available, Cancelled, Completed, Confirmed, GreenFee, Held, Slot, SlotData, SlotId,
    SlotState, SlotStatus,
};
use crate::error::{Result, TeeTimeError};

const SLOT_COLUMNS: &str = "id, course_id, play_date, tee_time, green_fee_tenths, player_count, \
    request_type, hole_count, caddy_type, includes_deposit, includes_meal, includes_cart, \
    requirement_note, kind, time_bucket, category, status, version, holder_id, holder_team_id, \
    held_at, confirmer_id, confirmer_team_id, confirmed_at, completed_at, cancelled_at";

/// PostgreSQL slot repository.
///
/// # Example
/// ```ignore
/// use teesheet::{PostgresStorage, ReservationService, SystemClock, TeeSheetConfig};
///
/// let pool = PgPool::connect("postgresql://localhost/teesheet").await?;
/// teesheet::migrator().run(&pool).await?;
/// let storage = Arc::new(PostgresStorage::new(pool));
/// let service =
///     ReservationService::new(storage, Arc::new(SystemClock), TeeSheetConfig::default())?;
/// ```
pub struct PostgresStorage<P: PoolProvider> {
    pools: P,
}

impl<P: PoolProvider> PostgresStorage<P> {
    pub fn new(pools: P) -> Self {
        Self { pools }
    }

    pub fn pools(&self) -> &P {
        &self.pools
    }
}

fn db_error(context: &str, e: sqlx::Error) -> TeeTimeError {
    TeeTimeError::Other(anyhow!("{}: {}", context, e))
}

/// Map insert failures that point at bad input rather than a broken store.
fn insert_error(context: &str, e: sqlx::Error) -> TeeTimeError {
    if let sqlx::Error::Database(db_err) = &e {
        match db_err.code().as_deref() {
            Some("23505") => {
                return TeeTimeError::InvalidInput(format!("{}: already exists", context));
            }
            Some("23503") => {
                return TeeTimeError::InvalidInput(format!("{}: unknown golf course", context));
            }
            _ => {}
        }
    }
    db_error(context, e)
}

async fn insert_slot<'e, E: PgExecutor<'e>>(executor: E, data: &SlotData) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tee_time_slots (
            id, course_id, play_date, tee_time, green_fee_tenths, player_count,
            request_type, hole_count, caddy_type, includes_deposit, includes_meal,
            includes_cart, requirement_note, kind, time_bucket, category,
            status, version
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
            'available', 0
        )
        "#,
    )
    .bind(*data.id)
    .bind(*data.course_id)
    .bind(data.date)
    .bind(data.time)
    .bind(data.green_fee.tenths())
    .bind(i16::from(data.player_count))
    .bind(&data.request_type)
    .bind(i16::from(data.hole_count))
    .bind(&data.caddy_type)
    .bind(data.includes_deposit)
    .bind(data.includes_meal)
    .bind(data.includes_cart)
    .bind(&data.requirement_note)
    .bind(data.kind.as_str())
    .bind(data.time_bucket.as_str())
    .bind(data.category.as_str())
    .execute(executor)
    .await
    .map_err(|e| insert_error("Failed to create slot", e))?;
    Ok(())
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| TeeTimeError::Other(anyhow!("Failed to read {}: {}", column, e)))
}

fn parse<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T> {
    let raw: String = get(row, column)?;
    raw.parse::<T>()
        .map_err(|e| TeeTimeError::Other(anyhow!("Invalid {} '{}': {}", column, raw, e)))
}

fn small(row: &PgRow, column: &str) -> Result<u8> {
    let value: i16 = get(row, column)?;
    u8::try_from(value)
        .map_err(|_| TeeTimeError::Other(anyhow!("{} out of range: {}", column, value)))
}

fn actor(row: &PgRow, id_column: &str, team_column: &str) -> Result<Option<Actor>> {
    let user_id: Option<String> = get(row, id_column)?;
    let team_id: Option<String> = get(row, team_column)?;
    Ok(user_id.map(|user_id| Actor {
        user_id: UserId(user_id),
        team_id: team_id.map(TeamId),
    }))
}

fn missing(slot_id: SlotId, status: SlotStatus, column: &str) -> TeeTimeError {
    TeeTimeError::Other(anyhow!(
        "Slot {} is {} but has no {}",
        slot_id,
        status.as_str(),
        column
    ))
}

fn slot_from_row(row: &PgRow) -> Result<AnySlot> {
    let id = SlotId(get::<Uuid>(row, "id")?);
    let data = SlotData {
        id,
        course_id: CourseId(get::<Uuid>(row, "course_id")?),
        date: get::<NaiveDate>(row, "play_date")?,
        time: get::<NaiveTime>(row, "tee_time")?,
        green_fee: GreenFee(get::<i64>(row, "green_fee_tenths")?),
        player_count: small(row, "player_count")?,
        request_type: get(row, "request_type")?,
        hole_count: small(row, "hole_count")?,
        caddy_type: get(row, "caddy_type")?,
        includes_deposit: get(row, "includes_deposit")?,
        includes_meal: get(row, "includes_meal")?,
        includes_cart: get(row, "includes_cart")?,
        requirement_note: get(row, "requirement_note")?,
        kind: parse(row, "kind")?,
        time_bucket: parse(row, "time_bucket")?,
        category: parse(row, "category")?,
    };
    let status: SlotStatus = parse(row, "status")?;
    let version: i64 = get(row, "version")?;

    let holder = actor(row, "holder_id", "holder_team_id")?;
    let held_at: Option<DateTime<Utc>> = get(row, "held_at")?;
    let confirmer = actor(row, "confirmer_id", "confirmer_team_id")?;
    let confirmed_at: Option<DateTime<Utc>> = get(row, "confirmed_at")?;

    let held = || -> Result<(Actor, DateTime<Utc>)> {
        match (holder.clone(), held_at) {
            (Some(holder), Some(held_at)) => Ok((holder, held_at)),
            _ => Err(missing(id, status, "holder")),
        }
    };
    let confirmed = || -> Result<(Actor, DateTime<Utc>)> {
        match (confirmer.clone(), confirmed_at) {
            (Some(confirmer), Some(confirmed_at)) => Ok((confirmer, confirmed_at)),
            _ => Err(missing(id, status, "confirmer")),
        }
    };

    let slot = match status {
        SlotStatus::Available => AnySlot::Available(Slot {
            state: Available {},
            data,
            version,
        }),
        SlotStatus::Held => {
            let (holder, held_at) = held()?;
            AnySlot::Held(Slot {
                state: Held { holder, held_at },
                data,
                version,
            })
        }
        SlotStatus::Confirmed => {
            let (holder, held_at) = held()?;
            let (confirmer, confirmed_at) = confirmed()?;
            AnySlot::Confirmed(Slot {
                state: Confirmed {
                    holder,
                    held_at,
                    confirmer,
                    confirmed_at,
                },
                data,
                version,
            })
        }
        SlotStatus::Completed => {
            let (holder, held_at) = held()?;
            let (confirmer, confirmed_at) = confirmed()?;
            let completed_at: Option<DateTime<Utc>> = get(row, "completed_at")?;
            AnySlot::Completed(Slot {
                state: Completed {
                    holder,
                    held_at,
                    confirmer,
                    confirmed_at,
                    completed_at: completed_at.ok_or_else(|| missing(id, status, "completed_at"))?,
                },
                data,
                version,
            })
        }
        SlotStatus::Cancelled => {
            let cancelled_at: Option<DateTime<Utc>> = get(row, "cancelled_at")?;
            AnySlot::Cancelled(Slot {
                state: Cancelled {
                    cancelled_at: cancelled_at.ok_or_else(|| missing(id, status, "cancelled_at"))?,
                },
                data,
                version,
            })
        }
    };
    Ok(slot)
}

fn course_from_row(row: &PgRow) -> Result<GolfCourse> {
    Ok(GolfCourse {
        id: CourseId(get::<Uuid>(row, "id")?),
        name: get(row, "name")?,
        region_name: get(row, "region_name")?,
        sequence: get(row, "sequence")?,
    })
}

fn link_from_row(row: &PgRow) -> Result<PackageLink> {
    Ok(PackageLink {
        id: PackageLinkId(get::<Uuid>(row, "id")?),
        primary_slot_id: SlotId(get::<Uuid>(row, "primary_slot_id")?),
        connected_slot_id: SlotId(get::<Uuid>(row, "connected_slot_id")?),
        accommodation_note: get(row, "accommodation_note")?,
        created_at: get(row, "created_at")?,
    })
}

fn new_slot(data: SlotData) -> Slot<Available> {
    Slot {
        state: Available {},
        data,
        version: 0,
    }
}

#[async_trait]
impl<P: PoolProvider> Storage for PostgresStorage<P> {
    #[tracing::instrument(
        skip(self, data),
        fields(slot_id = %data.id, course_id = %data.course_id)
    )]
    async fn create_slot(&self, data: SlotData) -> Result<Slot<Available>> {
        insert_slot(self.pools.write(), &data).await?;
        Ok(new_slot(data))
    }

    async fn get_slot(&self, id: SlotId) -> Result<AnySlot> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tee_time_slots WHERE id = $1",
            SLOT_COLUMNS
        ))
        .bind(*id)
        .fetch_optional(self.pools.write())
        .await
        .map_err(|e| db_error("Failed to fetch slot", e))?
        .ok_or(TeeTimeError::SlotNotFound(id))?;

        slot_from_row(&row)
    }

    #[tracing::instrument(
        skip(self, slot),
        fields(slot_id = %slot.data.id, expected = expected.as_str(), version = slot.version)
    )]
    async fn conditional_update<T: SlotState + Clone>(
        &self,
        slot: &Slot<T>,
        expected: SlotStatus,
    ) -> Result<UpdateOutcome>
    where
        AnySlot: From<Slot<T>>,
    {
        let next = AnySlot::from(slot.clone());
        let holder = next.holder();
        let confirmer = next.confirmer();
        let completed_at = match &next {
            AnySlot::Completed(s) => Some(s.state.completed_at),
            _ => None,
        };
        let cancelled_at = match &next {
            AnySlot::Cancelled(s) => Some(s.state.cancelled_at),
            _ => None,
        };

        let applied: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE tee_time_slots SET
                status = $4,
                version = version + 1,
                holder_id = $5,
                holder_team_id = $6,
                held_at = $7,
                confirmer_id = $8,
                confirmer_team_id = $9,
                confirmed_at = $10,
                completed_at = $11,
                cancelled_at = $12,
                updated_at = NOW()
            WHERE id = $1 AND status = $2 AND version = $3
            RETURNING version
            "#,
        )
        .bind(*slot.data.id)
        .bind(expected.as_str())
        .bind(slot.version)
        .bind(next.status().as_str())
        .bind(holder.map(|(actor, _)| actor.user_id.0.clone()))
        .bind(holder.and_then(|(actor, _)| actor.team_id.as_ref().map(|t| t.0.clone())))
        .bind(holder.map(|(_, at)| at))
        .bind(confirmer.map(|(actor, _)| actor.user_id.0.clone()))
        .bind(confirmer.and_then(|(actor, _)| actor.team_id.as_ref().map(|t| t.0.clone())))
        .bind(confirmer.map(|(_, at)| at))
        .bind(completed_at)
        .bind(cancelled_at)
        .fetch_optional(self.pools.write())
        .await
        .map_err(|e| db_error("Failed to update slot", e))?;

        if let Some(version) = applied {
            return Ok(UpdateOutcome::Applied { version });
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tee_time_slots WHERE id = $1)")
                .bind(*slot.data.id)
                .fetch_one(self.pools.write())
                .await
                .map_err(|e| db_error("Failed to check slot existence", e))?;

        Ok(if exists {
            UpdateOutcome::Conflict
        } else {
            UpdateOutcome::NotFound
        })
    }

    #[tracing::instrument(
        skip(self, filter),
        fields(
            statuses = ?filter.statuses,
            course_id = ?filter.course_id,
            from = ?filter.date_from,
            until = ?filter.date_until,
        )
    )]
    async fn query_slots(&self, filter: &SlotFilter) -> Result<Vec<AnySlot>> {
        let mut query_builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM tee_time_slots WHERE TRUE",
            SLOT_COLUMNS
        ));

        if !filter.statuses.is_empty() {
            let statuses: Vec<&str> = filter.statuses.iter().map(|s| s.as_str()).collect();
            query_builder.push(" AND status = ANY(");
            query_builder.push_bind(statuses);
            query_builder.push(")");
        }
        if let Some(course_id) = filter.course_id {
            query_builder.push(" AND course_id = ");
            query_builder.push_bind(*course_id);
        }
        if let Some(from) = filter.date_from {
            query_builder.push(" AND play_date >= ");
            query_builder.push_bind(from);
        }
        if let Some(until) = filter.date_until {
            query_builder.push(" AND play_date < ");
            query_builder.push_bind(until);
        }
        if let Some(category) = filter.category {
            query_builder.push(" AND category = ");
            query_builder.push_bind(category.as_str());
        }
        if let Some(kind) = filter.kind {
            query_builder.push(" AND kind = ");
            query_builder.push_bind(kind.as_str());
        }
        query_builder.push(" ORDER BY play_date, tee_time, id");

        let rows = query_builder
            .build()
            .fetch_all(self.pools.read())
            .await
            .map_err(|e| db_error("Failed to query slots", e))?;

        rows.iter().map(slot_from_row).collect()
    }

    async fn upsert_course(&self, course: GolfCourse) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO golf_courses (id, name, region_name, sequence)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                region_name = EXCLUDED.region_name,
                sequence = EXCLUDED.sequence,
                updated_at = NOW()
            "#,
        )
        .bind(*course.id)
        .bind(&course.name)
        .bind(&course.region_name)
        .bind(course.sequence)
        .execute(self.pools.write())
        .await
        .map_err(|e| db_error("Failed to upsert golf course", e))?;
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<GolfCourse>> {
        sqlx::query("SELECT id, name, region_name, sequence FROM golf_courses WHERE id = $1")
            .bind(*id)
            .fetch_optional(self.pools.write())
            .await
            .map_err(|e| db_error("Failed to fetch golf course", e))?
            .as_ref()
            .map(course_from_row)
            .transpose()
    }

    async fn list_courses(&self) -> Result<Vec<GolfCourse>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, region_name, sequence
            FROM golf_courses
            ORDER BY region_name, sequence, name
            "#,
        )
        .fetch_all(self.pools.read())
        .await
        .map_err(|e| db_error("Failed to list golf courses", e))?;

        rows.iter().map(course_from_row).collect()
    }

    #[tracing::instrument(skip_all, fields(link_id = %link.id))]
    async fn create_package(
        &self,
        primary: SlotData,
        connected: SlotData,
        link: PackageLink,
    ) -> Result<(Slot<Available>, Slot<Available>, PackageLink)> {
        let mut tx = self
            .pools
            .write()
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        insert_slot(&mut *tx, &primary).await?;
        insert_slot(&mut *tx, &connected).await?;

        let link = sqlx::query(
            r#"
            INSERT INTO package_links (
                id, primary_slot_id, connected_slot_id, accommodation_note, created_at
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING id, primary_slot_id, connected_slot_id, accommodation_note, created_at
            "#,
        )
        .bind(*link.id)
        .bind(*link.primary_slot_id)
        .bind(*link.connected_slot_id)
        .bind(&link.accommodation_note)
        .bind(link.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| insert_error("Failed to create package link", e))
        .and_then(|row| link_from_row(&row))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        Ok((new_slot(primary), new_slot(connected), link))
    }

    async fn get_package_link_for_slot(&self, slot_id: SlotId) -> Result<Option<PackageLink>> {
        sqlx::query(
            r#"
            SELECT id, primary_slot_id, connected_slot_id, accommodation_note, created_at
            FROM package_links
            WHERE primary_slot_id = $1 OR connected_slot_id = $1
            "#,
        )
        .bind(*slot_id)
        .fetch_optional(self.pools.write())
        .await
        .map_err(|e| db_error("Failed to fetch package link", e))?
        .as_ref()
        .map(link_from_row)
        .transpose()
    }

    async fn dissolve_package_link(&self, id: PackageLinkId) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM package_links WHERE id = $1")
            .bind(*id)
            .execute(self.pools.write())
            .await
            .map_err(|e| db_error("Failed to dissolve package link", e))?
            .rows_affected();

        if rows_affected == 0 {
            return Err(TeeTimeError::PackageNotFound(id));
        }
        Ok(())
    }
}
