//! SQLite-backed [`SpatialConnection`].
//!
//! Geometries are stored as EWKB blobs. Geometry columns are recorded in a
//! small registry table so a table can be described back into a schema, and
//! the read path filters rows with an envelope predicate registered on every
//! connection.

use std::{fmt, path::Path, sync::Arc};

use geo::{BoundingRect, Intersects, Rect, coord};
use log::debug;
use rusqlite::{
    Connection, OptionalExtension, Row, ToSql, functions::FunctionFlags, params,
    params_from_iter,
    types::{ToSqlOutput, ValueRef},
};

use crate::{
    codec::{EwkbCodec, GeometryCodec},
    feature::{Feature, FeatureId, ObjectValue, Value},
    filter::{FilterQuery, FilterSqlBuilder, SQLITE_ENVELOPE_FUNCTION, SqliteSqlBuilder},
    schema::{AttributeDefinition, AttributeType, FeatureSchema},
    statement::{SqlParam, Statement},
    table::{TableName, quote_identifier},
};

use super::{SpatialConnection, StorageError, TableSpec};

/// Table recording the geometry column, SRID, dimension and key of every
/// table created through this backend. Rows are keyed by `schema.table`, with
/// unqualified names filed under `main`.
pub const LAYER_REGISTRY_TABLE: &str = "geosync_layers";

const DEFAULT_SCHEMA: &str = "main";

const GEOMETRY_TYPE_NAMES: [&str; 8] = [
    "GEOMETRY",
    "POINT",
    "LINESTRING",
    "POLYGON",
    "MULTIPOINT",
    "MULTILINESTRING",
    "MULTIPOLYGON",
    "GEOMETRYCOLLECTION",
];

fn registry_key(table: &TableName) -> String {
    format!(
        "{}.{}",
        table.schema().unwrap_or(DEFAULT_SCHEMA),
        table.table()
    )
}

fn backend(step: &'static str) -> impl FnOnce(rusqlite::Error) -> StorageError {
    move |source| StorageError::Backend {
        step,
        source: Box::new(source),
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
            Self::Text(text) => text.to_sql(),
            Self::Integer(number) => number.to_sql(),
            Self::Double(number) => number.to_sql(),
            Self::Timestamp(timestamp) => timestamp.to_sql(),
            Self::Blob(bytes) => bytes.to_sql(),
        }
    }
}

/// SQLite connection with explicit autocommit control.
///
/// SQLite runs in autocommit mode unless a transaction is open; disabling
/// autocommit opens one and every [`SpatialConnection::commit`] opens the
/// next.
pub struct SqliteConnection {
    connection: Connection,
    manual_transactions: bool,
    codec: EwkbCodec,
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.connection.path())
            .field("manual_transactions", &self.manual_transactions)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(|source| StorageError::Open {
            location: path.display().to_string(),
            source: Box::new(source),
        })?;
        Self::initialise(connection)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let connection = Connection::open_in_memory().map_err(|source| StorageError::Open {
            location: ":memory:".to_owned(),
            source: Box::new(source),
        })?;
        Self::initialise(connection)
    }

    fn initialise(connection: Connection) -> Result<Self, StorageError> {
        register_envelope_function(&connection).map_err(backend("register envelope function"))?;
        connection
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {LAYER_REGISTRY_TABLE} (
                    table_name TEXT PRIMARY KEY,
                    geometry_column TEXT NOT NULL,
                    srid INTEGER,
                    dimension INTEGER NOT NULL,
                    primary_key TEXT
                )"
            ))
            .map_err(backend("create layer registry"))?;
        Ok(Self {
            connection,
            manual_transactions: false,
            codec: EwkbCodec::blob(),
        })
    }

    /// Underlying `rusqlite` connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn read_features(
        &self,
        sql: &str,
        table: &TableName,
        schema: &Arc<FeatureSchema>,
        order: &[usize],
    ) -> Result<Vec<Feature>, StorageError> {
        debug!("{sql}");
        let mut statement = self.connection.prepare(sql).map_err(backend("prepare select"))?;
        let mut rows = statement.query([]).map_err(backend("run select"))?;
        let mut features = Vec::new();
        while let Some(row) = rows.next().map_err(backend("read row"))? {
            let mut values = vec![Value::Null; schema.len()];
            for (column, &index) in order.iter().enumerate() {
                let Some(definition) = schema.attribute(index) else {
                    continue;
                };
                values[index] = self.read_value(row, column, definition, table)?;
            }
            let id = FeatureId(features.len() as u64 + 1);
            features.push(Feature::new(id, Arc::clone(schema), values)?);
        }
        Ok(features)
    }

    fn read_value(
        &self,
        row: &Row<'_>,
        column: usize,
        definition: &AttributeDefinition,
        table: &TableName,
    ) -> Result<Value, StorageError> {
        let read = backend("read column");
        let value = match definition.attribute_type {
            AttributeType::String => row
                .get::<_, Option<String>>(column)
                .map_err(read)?
                .map(Value::String),
            AttributeType::Integer => row
                .get::<_, Option<i64>>(column)
                .map_err(read)?
                .map(Value::Integer),
            AttributeType::Double => row
                .get::<_, Option<f64>>(column)
                .map_err(read)?
                .map(Value::Double),
            AttributeType::Date => row
                .get::<_, Option<chrono::NaiveDateTime>>(column)
                .map_err(read)?
                .map(Value::Date),
            AttributeType::Geometry => match row.get::<_, Option<Vec<u8>>>(column).map_err(read)? {
                Some(bytes) => {
                    let decoded = self.codec.decode(&bytes).map_err(|source| {
                        StorageError::Decode {
                            table: table.to_string(),
                            column: definition.name.clone(),
                            source,
                        }
                    })?;
                    Some(Value::Geometry(decoded.geometry))
                }
                None => None,
            },
            AttributeType::Object => match row.get_ref(column).map_err(read)? {
                ValueRef::Null => None,
                ValueRef::Blob(bytes) => Some(ObjectValue::Bytes(bytes.to_vec())),
                ValueRef::Text(text) => {
                    Some(ObjectValue::Text(String::from_utf8_lossy(text).into_owned()))
                }
                ValueRef::Integer(number) => Some(ObjectValue::Text(number.to_string())),
                ValueRef::Real(number) => Some(ObjectValue::Text(number.to_string())),
            }
            .map(Value::Object),
        };
        Ok(value.unwrap_or(Value::Null))
    }

    fn column_info(&self, table: &TableName) -> Result<Vec<ColumnInfo>, StorageError> {
        let mut statement = self
            .connection
            .prepare("SELECT name, type, pk FROM pragma_table_info(?1, ?2) ORDER BY cid")
            .map_err(backend("describe table"))?;
        let columns = statement
            .query_map(
                params![table.table(), table.schema().unwrap_or(DEFAULT_SCHEMA)],
                |row| {
                    Ok(ColumnInfo {
                        name: row.get(0)?,
                        declared_type: row.get(1)?,
                        primary_key: row.get::<_, i64>(2)? > 0,
                    })
                },
            )
            .map_err(backend("describe table"))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend("describe table"))?;
        if columns.is_empty() {
            return Err(StorageError::UnknownTable {
                table: table.to_string(),
            });
        }
        Ok(columns)
    }

    fn registration(&self, table: &TableName) -> Result<Option<Registration>, StorageError> {
        self.connection
            .query_row(
                &format!(
                    "SELECT geometry_column, primary_key FROM {LAYER_REGISTRY_TABLE} \
                     WHERE table_name = ?1"
                ),
                [registry_key(table)],
                |row| {
                    Ok(Registration {
                        geometry_column: row.get(0)?,
                        primary_key: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(backend("read layer registry"))
    }

    fn qualified(table: &TableName, object: &str) -> String {
        match table.schema() {
            Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(object)),
            None => quote_identifier(object),
        }
    }
}

struct ColumnInfo {
    name: String,
    declared_type: String,
    primary_key: bool,
}

struct Registration {
    geometry_column: String,
    primary_key: Option<String>,
}

fn is_geometry_type(declared: &str) -> bool {
    let declared = declared.trim().to_ascii_uppercase();
    GEOMETRY_TYPE_NAMES.contains(&declared.as_str())
}

fn attribute_type_for(declared: &str) -> AttributeType {
    let declared = declared.to_ascii_uppercase();
    if is_geometry_type(&declared) {
        AttributeType::Geometry
    } else if declared.contains("INT") {
        AttributeType::Integer
    } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| declared.contains(t)) {
        AttributeType::String
    } else if declared.contains("DATE") || declared.contains("TIME") {
        AttributeType::Date
    } else if ["REAL", "FLOA", "DOUB", "NUMERIC", "DECIMAL"]
        .iter()
        .any(|t| declared.contains(t))
    {
        AttributeType::Double
    } else {
        AttributeType::Object
    }
}

fn declared_type(attribute_type: AttributeType) -> &'static str {
    match attribute_type {
        AttributeType::String => "TEXT",
        AttributeType::Integer => "INTEGER",
        AttributeType::Double => "DOUBLE",
        AttributeType::Date => "TIMESTAMP",
        AttributeType::Geometry => "GEOMETRY",
        AttributeType::Object => "BLOB",
    }
}

fn register_envelope_function(connection: &Connection) -> rusqlite::Result<()> {
    let codec = EwkbCodec::blob();
    connection.create_scalar_function(
        SQLITE_ENVELOPE_FUNCTION,
        5,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let Some(bytes) = ctx.get::<Option<Vec<u8>>>(0)? else {
                return Ok(false);
            };
            let decoded = codec
                .decode(&bytes)
                .map_err(|err| rusqlite::Error::UserFunctionError(Box::new(err)))?;
            let Some(bounds) = decoded.geometry.bounding_rect() else {
                return Ok(false);
            };
            let window = Rect::new(
                coord! { x: ctx.get::<f64>(1)?, y: ctx.get::<f64>(2)? },
                coord! { x: ctx.get::<f64>(3)?, y: ctx.get::<f64>(4)? },
            );
            Ok(bounds.intersects(&window))
        },
    )
}

impl SpatialConnection for SqliteConnection {
    fn is_autocommit(&self) -> bool {
        !self.manual_transactions
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), StorageError> {
        if enabled && self.manual_transactions {
            if !self.connection.is_autocommit() {
                self.connection
                    .execute_batch("ROLLBACK")
                    .map_err(backend("roll back"))?;
            }
            self.manual_transactions = false;
        } else if !enabled && !self.manual_transactions {
            self.connection
                .execute_batch("BEGIN")
                .map_err(backend("begin transaction"))?;
            self.manual_transactions = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if !self.connection.is_autocommit() {
            self.connection
                .execute_batch("COMMIT")
                .map_err(backend("commit"))?;
        }
        if self.manual_transactions {
            self.connection
                .execute_batch("BEGIN")
                .map_err(backend("begin transaction"))?;
        }
        Ok(())
    }

    fn execute(&mut self, statement: &Statement) -> Result<usize, StorageError> {
        self.connection
            .execute(statement.sql(), params_from_iter(statement.params()))
            .map_err(backend("execute statement"))
    }

    fn table_exists(&mut self, table: &TableName) -> Result<bool, StorageError> {
        let sql = format!(
            "SELECT count(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            quote_identifier(table.schema().unwrap_or(DEFAULT_SCHEMA))
        );
        let count: i64 = self
            .connection
            .query_row(&sql, [table.table()], |row| row.get(0))
            .map_err(backend("look up table"))?;
        Ok(count > 0)
    }

    fn table_columns(&mut self, table: &TableName) -> Result<Vec<String>, StorageError> {
        Ok(self
            .column_info(table)?
            .into_iter()
            .map(|column| column.name)
            .collect())
    }

    fn describe_table(&mut self, table: &TableName) -> Result<FeatureSchema, StorageError> {
        let columns = self.column_info(table)?;
        let registration = self.registration(table)?;

        let geometry_column = registration
            .as_ref()
            .map(|r| r.geometry_column.clone())
            .or_else(|| {
                columns
                    .iter()
                    .find(|c| is_geometry_type(&c.declared_type))
                    .map(|c| c.name.clone())
            });
        let attributes = columns
            .iter()
            .map(|column| {
                let attribute_type = if geometry_column.as_deref() == Some(column.name.as_str()) {
                    AttributeType::Geometry
                } else {
                    match attribute_type_for(&column.declared_type) {
                        AttributeType::Geometry => AttributeType::Object,
                        other => other,
                    }
                };
                AttributeDefinition::new(column.name.clone(), attribute_type)
            })
            .collect();
        let schema = FeatureSchema::new(attributes)?;

        let declared_keys: Vec<_> = columns.iter().filter(|c| c.primary_key).collect();
        let primary_key = registration
            .and_then(|r| r.primary_key)
            .or_else(|| match declared_keys.as_slice() {
                [single] => Some(single.name.clone()),
                _ => None,
            });
        match primary_key {
            Some(name) => Ok(schema.with_external_primary_key(&name)?),
            None => Ok(schema),
        }
    }

    fn drop_table(&mut self, table: &TableName) -> Result<(), StorageError> {
        self.connection
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", table.quoted()))
            .map_err(backend("drop table"))?;
        self.connection
            .execute(
                &format!("DELETE FROM {LAYER_REGISTRY_TABLE} WHERE table_name = ?1"),
                [registry_key(table)],
            )
            .map_err(backend("unregister table"))?;
        Ok(())
    }

    fn create_table(&mut self, spec: &TableSpec) -> Result<(), StorageError> {
        let columns: Vec<_> = spec
            .columns
            .iter()
            .map(|column| {
                let mut definition = format!(
                    "{} {}",
                    quote_identifier(&column.name),
                    declared_type(column.attribute_type)
                );
                if spec.primary_key.as_deref() == Some(column.name.as_str()) {
                    definition.push_str(" PRIMARY KEY");
                }
                definition
            })
            .collect();
        let sql = format!("CREATE TABLE {} ({})", spec.table.quoted(), columns.join(", "));
        debug!("{sql}");
        self.connection
            .execute_batch(&sql)
            .map_err(backend("create table"))?;
        self.connection
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO {LAYER_REGISTRY_TABLE} \
                     (table_name, geometry_column, srid, dimension, primary_key) \
                     VALUES (?1, ?2, ?3, ?4, ?5)"
                ),
                params![
                    registry_key(&spec.table),
                    spec.geometry_column,
                    spec.srid,
                    spec.dimension.ordinates(),
                    spec.primary_key,
                ],
            )
            .map_err(backend("register table"))?;
        Ok(())
    }

    fn add_primary_key(&mut self, table: &TableName, column: &str) -> Result<(), StorageError> {
        let quoted_table = table.quoted();
        let bare_table = quote_identifier(table.table());
        let key = quote_identifier(column);
        let index = Self::qualified(table, &format!("{}_{column}_key", table.table()));
        let trigger = Self::qualified(table, &format!("{}_{column}_fill", table.table()));
        let sql = format!(
            "ALTER TABLE {quoted_table} ADD COLUMN {key} INTEGER;
             UPDATE {quoted_table} SET {key} = rowid;
             CREATE UNIQUE INDEX {index} ON {bare_table} ({key});
             CREATE TRIGGER {trigger} AFTER INSERT ON {bare_table}
             WHEN NEW.{key} IS NULL
             BEGIN
                 UPDATE {bare_table} SET {key} = NEW.rowid WHERE rowid = NEW.rowid;
             END;"
        );
        debug!("{sql}");
        self.connection
            .execute_batch(&sql)
            .map_err(backend("add primary key"))?;
        self.connection
            .execute(
                &format!("UPDATE {LAYER_REGISTRY_TABLE} SET primary_key = ?1 WHERE table_name = ?2"),
                params![column, registry_key(table)],
            )
            .map_err(backend("register primary key"))?;
        Ok(())
    }

    fn load_features(
        &mut self,
        table: &TableName,
        schema: &Arc<FeatureSchema>,
    ) -> Result<Vec<Feature>, StorageError> {
        let geometry_index = schema.geometry_index();
        let columns: Vec<_> = schema
            .attributes()
            .iter()
            .enumerate()
            .map(|(index, definition)| {
                if index == geometry_index {
                    self.codec.decode_column_expression(&definition.name)
                } else {
                    quote_identifier(&definition.name)
                }
            })
            .collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            columns.join(", "),
            table.quoted()
        );
        let order: Vec<_> = (0..schema.len()).collect();
        self.read_features(&sql, table, schema, &order)
    }

    fn query(
        &mut self,
        query: &FilterQuery,
        schema: &Arc<FeatureSchema>,
    ) -> Result<Vec<Feature>, StorageError> {
        let geometry = query.geometry_attribute();
        let names: Vec<String> = schema.names().map(str::to_owned).collect();
        let sql = SqliteSqlBuilder::new(names).sql(query)?;

        let geometry_index = schema
            .index_of(geometry)
            .unwrap_or_else(|| schema.geometry_index());
        let order: Vec<_> = std::iter::once(geometry_index)
            .chain(
                schema
                    .names()
                    .enumerate()
                    .filter(|(_, name)| !name.eq_ignore_ascii_case(geometry))
                    .map(|(index, _)| index),
            )
            .collect();
        self.read_features(&sql, query.dataset(), schema, &order)
    }

    fn finalize_update(&mut self, table: &TableName) -> Result<(), StorageError> {
        self.connection
            .execute_batch(&format!("ANALYZE {}", table.quoted()))
            .map_err(backend("analyze"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::Dimension, statement::StatementBuilder};
    use geo::{Geometry, LineString, Point, Polygon, line_string};
    use rstest::{fixture, rstest};

    #[fixture]
    fn connection() -> SqliteConnection {
        SqliteConnection::open_in_memory().expect("in-memory database")
    }

    fn roads_schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            AttributeDefinition::new("name", AttributeType::String),
            AttributeDefinition::new("lanes", AttributeType::Integer),
            AttributeDefinition::new("geom", AttributeType::Geometry),
        ])
        .expect("valid schema")
    }

    fn create_roads(connection: &mut SqliteConnection) -> TableName {
        let table = TableName::parse("roads");
        let spec = TableSpec::from_schema(
            table.clone(),
            &roads_schema(),
            Some(4326),
            Dimension::Xy,
            false,
        );
        connection.create_table(&spec).expect("create table");
        table
    }

    fn insert_road(
        connection: &mut SqliteConnection,
        table: &TableName,
        name: &str,
        geometry: Geometry<f64>,
    ) {
        let codec = EwkbCodec::blob();
        let schema = Arc::new(roads_schema());
        let feature = Feature::new(
            FeatureId(0),
            schema,
            vec![Value::from(name), Value::Integer(2), Value::Geometry(geometry)],
        )
        .expect("valid feature");
        let statement = StatementBuilder::new(table.clone(), &codec)
            .insert(&feature)
            .expect("insert statement");
        connection.execute(&statement).expect("insert");
    }

    fn segment(x: f64) -> Geometry<f64> {
        Geometry::LineString(line_string![(x: x, y: 0.0), (x: x + 1.0, y: 1.0)])
    }

    #[rstest]
    fn describes_created_tables(mut connection: SqliteConnection) {
        let table = create_roads(&mut connection);
        assert!(connection.table_exists(&table).expect("lookup"));
        let schema = connection.describe_table(&table).expect("describe");
        assert_eq!(schema, roads_schema());
    }

    #[rstest]
    fn unknown_tables_are_reported(mut connection: SqliteConnection) {
        let err = connection
            .describe_table(&TableName::parse("missing"))
            .expect_err("no table");
        assert!(matches!(err, StorageError::UnknownTable { .. }));
    }

    #[rstest]
    fn envelope_query_filters_rows(mut connection: SqliteConnection) {
        let table = create_roads(&mut connection);
        insert_road(&mut connection, &table, "near", segment(0.0));
        insert_road(&mut connection, &table, "far", segment(50.0));

        let window = Geometry::Point(Point::new(0.5, 0.5));
        let schema = Arc::new(roads_schema());
        let query = FilterQuery::new("roads", "geom", window);
        let found = connection.query(&query, &schema).expect("query");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attribute("name"), Some(&Value::from("near")));
        assert_eq!(found[0].geometry(), &Value::Geometry(segment(0.0)));
    }

    #[rstest]
    fn disabling_autocommit_defers_writes_until_commit(mut connection: SqliteConnection) {
        let table = create_roads(&mut connection);
        connection.set_autocommit(false).expect("begin");
        insert_road(&mut connection, &table, "kept", segment(0.0));
        connection.commit().expect("commit");
        insert_road(&mut connection, &table, "discarded", segment(1.0));
        connection.set_autocommit(true).expect("restore");

        let schema = Arc::new(roads_schema());
        let rows = connection.load_features(&table, &schema).expect("load");
        let names: Vec<_> = rows.iter().filter_map(|f| f.attribute("name")).collect();
        assert_eq!(names, [&Value::from("kept")]);
        assert!(connection.is_autocommit());
    }

    #[rstest]
    fn generated_keys_number_existing_and_new_rows(mut connection: SqliteConnection) {
        let table = create_roads(&mut connection);
        insert_road(&mut connection, &table, "a", segment(0.0));
        insert_road(&mut connection, &table, "b", segment(1.0));
        connection.add_primary_key(&table, "gid").expect("add key");
        insert_road(&mut connection, &table, "c", segment(2.0));

        let schema = Arc::new(connection.describe_table(&table).expect("describe"));
        assert_eq!(schema.external_primary_key_index(), schema.index_of("gid"));
        let rows = connection.load_features(&table, &schema).expect("load");
        let keys: Vec<_> = rows.iter().filter_map(|f| f.attribute("gid")).collect();
        assert_eq!(
            keys,
            [&Value::Integer(1), &Value::Integer(2), &Value::Integer(3)]
        );
        assert_eq!(rows[2].id(), FeatureId(3));
    }

    #[rstest]
    fn dropping_a_table_clears_its_registration(mut connection: SqliteConnection) {
        let table = create_roads(&mut connection);
        connection.drop_table(&table).expect("drop");
        assert!(!connection.table_exists(&table).expect("lookup"));
        assert!(connection.registration(&table).expect("registry").is_none());
        connection.finalize_update(&TableName::parse(LAYER_REGISTRY_TABLE)).expect("analyze");
    }

    #[rstest]
    fn qualified_and_bare_names_share_a_registration(mut connection: SqliteConnection) {
        let table = create_roads(&mut connection);
        connection.add_primary_key(&table, "gid").expect("add key");

        let qualified = TableName::parse("main.roads");
        let schema = connection.describe_table(&qualified).expect("describe");
        assert_eq!(schema.external_primary_key_index(), schema.index_of("gid"));

        connection.drop_table(&qualified).expect("drop");
        assert!(connection.registration(&table).expect("registry").is_none());
    }

    #[rstest]
    fn polygons_survive_a_round_trip(mut connection: SqliteConnection) {
        let table = create_roads(&mut connection);
        let square = Geometry::Polygon(Polygon::new(
            LineString::from(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 0.0)]),
            Vec::new(),
        ));
        insert_road(&mut connection, &table, "square", square.clone());
        let rows = connection
            .load_features(&table, &Arc::new(roads_schema()))
            .expect("load");
        assert_eq!(rows[0].geometry(), &Value::Geometry(square));
    }

    #[rstest]
    #[case("INTEGER", AttributeType::Integer)]
    #[case("varchar(20)", AttributeType::String)]
    #[case("TIMESTAMP", AttributeType::Date)]
    #[case("DOUBLE", AttributeType::Double)]
    #[case("POINT", AttributeType::Geometry)]
    #[case("BLOB", AttributeType::Object)]
    #[case("", AttributeType::Object)]
    fn maps_declared_types(#[case] declared: &str, #[case] expected: AttributeType) {
        assert_eq!(attribute_type_for(declared), expected);
    }
}
