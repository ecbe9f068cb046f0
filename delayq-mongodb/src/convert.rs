//! Translation between the store vocabulary of `delayq` and BSON.
use chrono::{DateTime, Utc};
use delayq::{
    document::{fields, Document},
    item::ItemId,
    store::{Filter, Index, IndexOrder, StoreError, Update},
};
use mongodb::{
    bson::{self, oid::ObjectId, Bson, DateTime as BsonDateTime, Document as BsonDocument},
    options::IndexOptions,
    IndexModel,
};

pub(crate) trait ToFilter {
    fn to_filter(&self) -> BsonDocument;
}

impl ToFilter for Filter {
    fn to_filter(&self) -> BsonDocument {
        match self {
            Filter::And(filters) if filters.is_empty() => BsonDocument::new(),
            Filter::And(filters) => single("$and", combine(filters)),
            // An empty disjunction matches nothing, which the server refuses to express.
            Filter::Or(filters) if filters.is_empty() => {
                single(fields::ID, single("$exists", false))
            }
            Filter::Or(filters) => single("$or", combine(filters)),
            Filter::IdEquals(id) => single(fields::ID, id_to_bson(id)),
            Filter::StatusEqual(status) => single(fields::STATUS, status.as_str()),
            Filter::RunDateAtOrBefore(date) => {
                single(fields::RUN_DATE, single("$lte", to_bson_datetime(*date)))
            }
            Filter::RunDateBefore(date) => {
                single(fields::RUN_DATE, single("$lt", to_bson_datetime(*date)))
            }
            Filter::HeartbeatAtOrBefore(date) => {
                single(fields::HEARTBEAT, single("$lte", to_bson_datetime(*date)))
            }
            Filter::HeartbeatEqual(date) => single(fields::HEARTBEAT, to_bson_datetime(*date)),
            // Matches both a null heartbeat and a document without the field.
            Filter::HeartbeatMissing => single(fields::HEARTBEAT, Bson::Null),
        }
    }
}

fn combine(filters: &[Filter]) -> Vec<Bson> {
    filters
        .iter()
        .map(|filter| Bson::Document(filter.to_filter()))
        .collect()
}

fn single(key: &str, value: impl Into<Bson>) -> BsonDocument {
    let mut document = BsonDocument::new();
    document.insert(key, value);
    document
}

/// The `$set` modification for an update, or `None` when the update sets nothing.
pub(crate) fn to_modifications(update: &Update) -> Option<BsonDocument> {
    let mut set = BsonDocument::new();
    if let Some(status) = update.status {
        set.insert(fields::STATUS, status.as_str());
    }
    if let Some(heartbeat) = update.heartbeat {
        set.insert(fields::HEARTBEAT, to_bson_datetime(heartbeat));
    }
    (!set.is_empty()).then(|| single("$set", set))
}

/// Any id on the document is dropped so that the server assigns one.
pub(crate) fn to_bson_document(document: Document) -> Result<BsonDocument, StoreError> {
    let mut out = BsonDocument::new();
    if let Some(status) = document.status {
        out.insert(fields::STATUS, status);
    }
    if let Some(run_date) = document.run_date {
        out.insert(fields::RUN_DATE, to_bson_datetime(run_date));
    }
    if let Some(heartbeat) = document.heartbeat {
        out.insert(fields::HEARTBEAT, to_bson_datetime(heartbeat));
    }
    for (field, value) in document.payload {
        if fields::is_reserved(&field) {
            return Err(StoreError::InvalidDocument(format!(
                "payload uses reserved field `{field}`"
            )));
        }
        let value =
            bson::to_bson(&value).map_err(|err| StoreError::InvalidDocument(err.to_string()))?;
        out.insert(field, value);
    }
    Ok(out)
}

pub(crate) fn from_bson_document(mut document: BsonDocument) -> Document {
    let id = document.remove(fields::ID).map(bson_to_id);
    let status = match document.remove(fields::STATUS) {
        Some(Bson::String(status)) => Some(status),
        _ => None,
    };
    let run_date = document
        .remove(fields::RUN_DATE)
        .and_then(from_bson_datetime);
    let heartbeat = document
        .remove(fields::HEARTBEAT)
        .and_then(from_bson_datetime);
    let payload = document
        .into_iter()
        .map(|(field, value)| (field, value.into_relaxed_extjson()))
        .collect();

    Document {
        id,
        status,
        run_date,
        heartbeat,
        payload,
    }
}

/// Ids which look like an `ObjectId` are queried as one, anything else as a plain string.
pub(crate) fn id_to_bson(id: &ItemId) -> Bson {
    ObjectId::parse_str(id.as_str())
        .map(Bson::ObjectId)
        .unwrap_or_else(|_| Bson::String(id.as_str().to_owned()))
}

pub(crate) fn bson_to_id(id: Bson) -> ItemId {
    match id {
        Bson::ObjectId(id) => id.to_hex().into(),
        Bson::String(id) => id.into(),
        other => other.to_string().into(),
    }
}

pub(crate) fn to_index_model(index: &Index) -> IndexModel {
    let mut keys = BsonDocument::new();
    for (field, order) in &index.keys {
        let order = match order {
            IndexOrder::Ascending => 1,
            IndexOrder::Descending => -1,
        };
        keys.insert(*field, order);
    }
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(index.name.to_owned()).build())
        .build()
}

fn to_bson_datetime(date: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(date.timestamp_millis())
}

fn from_bson_datetime(value: Bson) -> Option<DateTime<Utc>> {
    match value {
        Bson::DateTime(date) => DateTime::<Utc>::from_timestamp_millis(date.timestamp_millis()),
        _ => None,
    }
}
