//! Staff CRUD and search
//!
//! Every write runs in its own transaction through
//! `Database::run_in_transaction`; list and search read from the replica
//! when one is configured.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::{CallerContext, Clock};
use crate::db::{Database, DbError, KeyUniqueness, Op, Order, Repository, Select};
use crate::error::{Result, StaffError};
use crate::models::{FullName, Gender, Staff, StaffId, ValidationError};

/// Largest age accepted by search filters.
pub const MAX_SEARCH_AGE: u32 = 200;

/// Body of a create request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStaffRequest {
    #[serde(default, alias = "id")]
    pub staff_id: String,
    #[serde(default, alias = "name")]
    pub full_name: String,
    pub birthday: Option<NaiveDate>,
    pub gender: Option<i32>,
}

impl CreateStaffRequest {
    /// Validate into an unsaved `Staff`.
    pub fn validate(&self) -> std::result::Result<Staff, ValidationError> {
        let id = StaffId::new(&self.staff_id)?;
        let details = StaffDetails::validate(&self.full_name, self.birthday, self.gender)?;
        Ok(Staff::new(
            id.into_string(),
            details.full_name.into_string(),
            details.birthday,
            details.gender.code(),
        ))
    }
}

/// Body of an update request. The staff id comes from the path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStaffRequest {
    #[serde(default, alias = "name")]
    pub full_name: String,
    pub birthday: Option<NaiveDate>,
    pub gender: Option<i32>,
}

/// Validated mutable fields shared by create and update.
#[derive(Debug, Clone)]
struct StaffDetails {
    full_name: FullName,
    birthday: NaiveDate,
    gender: Gender,
}

impl StaffDetails {
    fn validate(
        full_name: &str,
        birthday: Option<NaiveDate>,
        gender: Option<i32>,
    ) -> std::result::Result<Self, ValidationError> {
        let full_name = FullName::new(full_name)?;
        let birthday = birthday.ok_or(ValidationError::Missing { field: "birthday" })?;
        let gender = Gender::try_from(gender.ok_or(ValidationError::Missing { field: "gender" })?)?;
        Ok(Self {
            full_name,
            birthday,
            gender,
        })
    }

    fn apply(&self, staff: &mut Staff) {
        staff.full_name = self.full_name.as_str().to_owned();
        staff.birthday = self.birthday;
        staff.gender = self.gender.code();
    }
}

/// Search filters. Absent or empty filters are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffSearchQuery {
    /// Substring of the staff id
    pub staff_id: Option<String>,
    /// Substring of the full name
    pub full_name: Option<String>,
    pub gender: Option<i32>,
    /// Inclusive lower bound
    pub birthday_from: Option<NaiveDate>,
    /// Inclusive upper bound
    pub birthday_to: Option<NaiveDate>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
}

impl StaffSearchQuery {
    /// Narrow `query` by every filter that is set, ordered by staff id.
    pub fn apply(
        &self,
        mut query: Select<Staff>,
        today: NaiveDate,
    ) -> std::result::Result<Select<Staff>, ValidationError> {
        if let Some(id) = non_empty(&self.staff_id) {
            query = query.filter("id", Op::Contains, id);
        }
        if let Some(name) = non_empty(&self.full_name) {
            query = query.filter("full_name", Op::Contains, name);
        }
        if let Some(code) = self.gender {
            query = query.filter("gender", Op::Eq, Gender::try_from(code)?.code());
        }
        if let Some(from) = self.birthday_from {
            query = query.filter("birthday", Op::Ge, from);
        }
        if let Some(to) = self.birthday_to {
            query = query.filter("birthday", Op::Le, to);
        }
        if let Some(min) = self.min_age {
            query = query.filter("birthday", Op::Le, born_latest(today, check_age("minAge", min)?));
        }
        if let Some(max) = self.max_age {
            query = query.filter("birthday", Op::Gt, born_after(today, check_age("maxAge", max)?));
        }
        Ok(query.order_by("id", Order::Asc))
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

fn check_age(field: &'static str, age: u32) -> std::result::Result<u32, ValidationError> {
    if age > MAX_SEARCH_AGE {
        return Err(ValidationError::InvalidFormat {
            field,
            reason: "must be at most 200",
        });
    }
    Ok(age)
}

fn years_before(today: NaiveDate, years: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(years * 12))
        .unwrap_or(NaiveDate::MIN)
}

/// Latest birthday of someone at least `min_age` years old on `today`.
pub fn born_latest(today: NaiveDate, min_age: u32) -> NaiveDate {
    years_before(today, min_age)
}

/// Everyone at most `max_age` years old on `today` was born after this date.
pub fn born_after(today: NaiveDate, max_age: u32) -> NaiveDate {
    years_before(today, max_age + 1)
}

/// Completed years between `birthday` and `today`.
pub fn age_on(birthday: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birthday.year();
    if (today.month(), today.day()) < (birthday.month(), birthday.day()) {
        age -= 1;
    }
    age
}

/// Staff record as returned to API callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffResponse {
    pub staff_id: String,
    pub full_name: String,
    pub birthday: NaiveDate,
    pub gender: i32,
    pub gender_display: String,
    pub age: i32,
    pub created_by: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_by: Option<String>,
    pub updated_at: NaiveDateTime,
}

impl StaffResponse {
    pub fn from_staff(staff: Staff, today: NaiveDate) -> Self {
        let gender_display = Gender::try_from(staff.gender)
            .map(Gender::display_name)
            .unwrap_or("Unknown")
            .to_owned();
        Self {
            age: age_on(staff.birthday, today),
            staff_id: staff.id,
            full_name: staff.full_name,
            birthday: staff.birthday,
            gender: staff.gender,
            gender_display,
            created_by: staff.created_by,
            created_at: staff.created_at,
            updated_by: staff.updated_by,
            updated_at: staff.updated_at,
        }
    }
}

/// Staff operations for one caller
#[derive(Debug, Clone)]
pub struct StaffLogic {
    db: Database,
    /// Staff ids are unique; the key rule reports the clash.
    repo: Repository<Staff, KeyUniqueness>,
    clock: Clock,
}

impl StaffLogic {
    pub fn new(db: Database, caller: CallerContext) -> Result<Self> {
        let clock = caller.clock();
        let repo = Repository::new(&db, caller, KeyUniqueness)?;
        Ok(Self { db, repo, clock })
    }

    /// Create a staff record.
    ///
    /// # Errors
    ///
    /// `StaffError::Validation` for invalid input, `StaffError::Duplicate`
    /// when the id is taken.
    pub async fn create(&self, request: CreateStaffRequest) -> Result<StaffResponse> {
        let staff = request.validate()?;
        let repo = self.repo.clone();

        let stored = self
            .db
            .run_in_transaction(move |conn| {
                let (repo, staff) = (repo.clone(), staff.clone());
                Box::pin(async move { repo.add(conn, staff).await })
            })
            .await?;

        info!(staff_id = %stored.id, by = self.repo.caller().audit_name(), "staff created");
        Ok(self.respond(stored))
    }

    pub async fn get(&self, id: &str) -> Result<Option<StaffResponse>> {
        let staff = self.repo.find_by_id(self.db.primary(), id).await?;
        Ok(staff.map(|s| self.respond(s)))
    }

    /// Replace name, birthday and gender. The id never changes.
    pub async fn update(&self, id: &str, request: UpdateStaffRequest) -> Result<StaffResponse> {
        let details =
            StaffDetails::validate(&request.full_name, request.birthday, request.gender)?;
        let repo = self.repo.clone();
        let id = id.to_owned();

        let stored = self
            .db
            .run_in_transaction(move |conn| {
                let (repo, id, details) = (repo.clone(), id.clone(), details.clone());
                Box::pin(async move {
                    let mut staff = repo.find_by_id(&mut *conn, &id).await?.ok_or_else(|| {
                        DbError::NotFound {
                            resource: repo.descriptor().entity(),
                            id: id.clone(),
                        }
                    })?;
                    details.apply(&mut staff);
                    repo.update(conn, staff).await
                })
            })
            .await?;

        info!(staff_id = %stored.id, by = self.repo.caller().audit_name(), "staff updated");
        Ok(self.respond(stored))
    }

    /// # Errors
    ///
    /// `StaffError::NotFound` when no record has this id.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(StaffError::NotFound { id: String::new() });
        }
        let repo = self.repo.clone();
        let id = id.to_owned();

        let removed = self
            .db
            .run_in_transaction(move |conn| {
                let (repo, id) = (repo.clone(), id.clone());
                Box::pin(async move { repo.remove_by_id(conn, &id).await })
            })
            .await?;

        info!(staff_id = %removed.id, by = self.repo.caller().audit_name(), "staff deleted");
        Ok(())
    }

    /// All staff ordered by id.
    pub async fn list(&self) -> Result<Vec<StaffResponse>> {
        let staff = self
            .repo
            .all()
            .order_by("id", Order::Asc)
            .fetch_all(self.db.reader())
            .await?;
        Ok(self.respond_all(staff))
    }

    pub async fn search(&self, query: &StaffSearchQuery) -> Result<Vec<StaffResponse>> {
        let select = query.apply(self.repo.all(), self.clock.today())?;
        let staff = select.fetch_all(self.db.reader()).await?;
        Ok(self.respond_all(staff))
    }

    fn respond(&self, staff: Staff) -> StaffResponse {
        StaffResponse::from_staff(staff, self.clock.today())
    }

    fn respond_all(&self, staff: Vec<Staff>) -> Vec<StaffResponse> {
        let today = self.clock.today();
        staff
            .into_iter()
            .map(|s| StaffResponse::from_staff(s, today))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SchemaModel;
    use crate::models::StaffConfig;
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_request() -> CreateStaffRequest {
        CreateStaffRequest {
            staff_id: "ST001".into(),
            full_name: " Jane Doe ".into(),
            birthday: Some(date(1990, 5, 1)),
            gender: Some(2),
        }
    }

    fn staff_select() -> Select<Staff> {
        let mut model = SchemaModel::new();
        model.apply(&StaffConfig).unwrap();
        Select::new(model.descriptor::<Staff>().unwrap(), true)
    }

    #[test]
    fn create_request_validates_into_staff() {
        let staff = create_request().validate().unwrap();
        assert_eq!(staff.id, "ST001");
        assert_eq!(staff.full_name, "Jane Doe");
        assert_eq!(staff.gender, 2);
        assert!(staff.created_by.is_none());
    }

    #[test]
    fn create_request_rejects_bad_input() {
        let mut req = create_request();
        req.staff_id = "TOOLONG01".into();
        assert!(matches!(req.validate(), Err(ValidationError::TooLong { .. })));

        let mut req = create_request();
        req.full_name = "   ".into();
        assert!(matches!(req.validate(), Err(ValidationError::Empty { .. })));

        let mut req = create_request();
        req.birthday = None;
        assert_eq!(
            req.validate().unwrap_err(),
            ValidationError::Missing { field: "birthday" }
        );

        let mut req = create_request();
        req.gender = Some(3);
        assert!(matches!(req.validate(), Err(ValidationError::InvalidVariant { .. })));
    }

    #[test]
    fn requests_accept_aliases() {
        let req: CreateStaffRequest = serde_json::from_str(
            r#"{"id":"ST002","name":"John","birthday":"1985-01-31","gender":1}"#,
        )
        .unwrap();
        assert_eq!(req.staff_id, "ST002");
        assert_eq!(req.full_name, "John");

        let req: CreateStaffRequest = serde_json::from_str(
            r#"{"staffId":"ST003","fullName":"Ann","birthday":"1985-01-31","gender":2}"#,
        )
        .unwrap();
        assert_eq!(req.staff_id, "ST003");
    }

    #[test]
    fn age_counts_completed_years() {
        assert_eq!(age_on(date(1990, 5, 1), date(2024, 4, 30)), 33);
        assert_eq!(age_on(date(1990, 5, 1), date(2024, 5, 1)), 34);
        assert_eq!(age_on(date(2000, 2, 29), date(2023, 2, 28)), 22);
        assert_eq!(age_on(date(2000, 2, 29), date(2024, 2, 29)), 24);
    }

    #[test]
    fn age_bounds() {
        let today = date(2024, 6, 15);
        assert_eq!(born_latest(today, 30), date(1994, 6, 15));
        assert_eq!(born_after(today, 30), date(1993, 6, 15));
        assert_eq!(born_latest(date(2024, 2, 29), 1), date(2023, 2, 28));

        // A 30 year old qualifies for both minAge=30 and maxAge=30
        let birthday = date(1994, 1, 1);
        assert!(birthday <= born_latest(today, 30));
        assert!(birthday > born_after(today, 30));
        assert_eq!(age_on(birthday, today), 30);
    }

    #[test]
    fn empty_search_lists_everything_by_id() {
        let select = StaffSearchQuery::default()
            .apply(staff_select(), date(2024, 1, 1))
            .unwrap();
        assert!(select
            .to_query_builder()
            .unwrap()
            .sql()
            .ends_with("FROM staff ORDER BY staff_id ASC"));
    }

    #[test]
    fn search_filters_render_in_order() {
        let query = StaffSearchQuery {
            staff_id: Some("ST".into()),
            full_name: Some(String::new()),
            gender: Some(1),
            birthday_from: Some(date(1980, 1, 1)),
            birthday_to: None,
            min_age: Some(18),
            max_age: Some(65),
        };
        let select = query.apply(staff_select(), date(2024, 1, 1)).unwrap();
        let qb = select.to_query_builder().unwrap();
        assert!(qb.sql().ends_with(
            "FROM staff WHERE staff_id LIKE $1 ESCAPE '\\' AND gender = $2 \
             AND birthday >= $3 AND birthday <= $4 AND birthday > $5 ORDER BY staff_id ASC"
        ));
    }

    #[test]
    fn search_rejects_bad_gender_and_age() {
        let query = StaffSearchQuery {
            gender: Some(7),
            ..Default::default()
        };
        assert!(query.apply(staff_select(), date(2024, 1, 1)).is_err());

        let query = StaffSearchQuery {
            max_age: Some(1000),
            ..Default::default()
        };
        assert!(query.apply(staff_select(), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn response_shape() {
        let mut staff = create_request().validate().unwrap();
        let at = date(2024, 1, 2).and_hms_opt(3, 4, 5).unwrap();
        staff.created_by = Some("admin".into());
        staff.created_at = at;
        staff.updated_by = Some("admin".into());
        staff.updated_at = at;

        let response = StaffResponse::from_staff(staff, date(2024, 6, 1));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["staffId"], "ST001");
        assert_eq!(json["fullName"], "Jane Doe");
        assert_eq!(json["birthday"], "1990-05-01");
        assert_eq!(json["genderDisplay"], "Female");
        assert_eq!(json["age"], 34);
        assert_eq!(json["createdBy"], "admin");
        assert_eq!(json["createdAt"], "2024-01-02T03:04:05");
    }

    #[tokio::test]
    async fn logic_requires_staff_mapping() {
        let pool = crate::db::pool::create_lazy_pool("postgres://nobody@127.0.0.1:1/none", 1)
            .unwrap();
        let db = Database::from_pool(pool, Arc::new(SchemaModel::new()));
        let err = StaffLogic::new(db, CallerContext::anonymous()).unwrap_err();
        assert!(matches!(err, StaffError::Database(DbError::Unmapped { .. })));
    }
}
