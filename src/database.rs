use crate::models::{ComparableRecord, ListingRecord};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use uuid::Uuid;

/// SQLite store for sold listings and their comparables.
///
/// `hemnet_items.hemnet_id` is unique; inserting a listing that is already
/// stored is a no-op. Every row gets `collected_at` stamped on insert.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS hemnet_items (
                uuid TEXT PRIMARY KEY,
                hemnet_id INTEGER NOT NULL UNIQUE,
                url TEXT NOT NULL,
                broker_name TEXT,
                broker_phone TEXT,
                broker_email TEXT,
                broker_firm TEXT,
                broker_firm_phone TEXT,
                sold_date TEXT,
                price INTEGER,
                asked_price INTEGER,
                price_per_square_meter INTEGER,
                price_trend_flat INTEGER,
                price_trend_percentage INTEGER,
                rooms REAL,
                monthly_fee INTEGER,
                square_meters REAL,
                cost_per_year INTEGER,
                year TEXT,
                type TEXT,
                association TEXT,
                lot_size INTEGER,
                biarea INTEGER,
                address TEXT,
                geographic_area TEXT,
                collected_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_broker_email ON hemnet_items(broker_email)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS hemnet_comp_items (
                uuid TEXT PRIMARY KEY,
                hemnet_id INTEGER,
                salda_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                latitude REAL,
                longitude REAL,
                city TEXT,
                postal_city TEXT,
                district TEXT,
                country TEXT,
                region TEXT,
                municipality TEXT,
                street TEXT,
                location TEXT,
                main_location TEXT,
                street_address TEXT,
                offers_selling_price INTEGER,
                new_production INTEGER,
                upcoming_open_houses INTEGER,
                home_swapping INTEGER,
                has_price_change INTEGER,
                has_active_toplisting INTEGER,
                living_area REAL,
                rooms REAL,
                broker_firm TEXT,
                status TEXT,
                price INTEGER,
                monthly_fee INTEGER,
                cost_per_year INTEGER,
                publication_date TEXT,
                images_count INTEGER,
                item_type TEXT,
                price_per_m2 INTEGER,
                collected_at TEXT NOT NULL
            )",
            [],
        )?;

        // Comparables are looked up by the listing they belong to
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_comp_salda_id ON hemnet_comp_items(salda_id)",
            [],
        )?;

        Ok(())
    }

    /// Store a listing. Returns false when a listing with the same identifier already exists.
    pub fn insert_listing(&self, listing: &ListingRecord) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO hemnet_items (
                uuid, hemnet_id, url, broker_name, broker_phone, broker_email, broker_firm,
                broker_firm_phone, sold_date, price, asked_price, price_per_square_meter,
                price_trend_flat, price_trend_percentage, rooms, monthly_fee, square_meters,
                cost_per_year, year, type, association, lot_size, biarea, address,
                geographic_area, collected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
            params![
                Uuid::new_v4().to_string(),
                listing.hemnet_id,
                &listing.url,
                &listing.broker_name,
                &listing.broker_phone,
                &listing.broker_email,
                &listing.broker_firm,
                &listing.broker_firm_phone,
                listing.sold_date,
                listing.price,
                listing.asked_price,
                listing.price_per_square_meter,
                listing.price_trend_flat,
                listing.price_trend_percentage,
                listing.rooms,
                listing.monthly_fee,
                listing.square_meters,
                listing.cost_per_year,
                &listing.year,
                &listing.property_type,
                &listing.association,
                listing.lot_size,
                listing.biarea,
                &listing.address,
                &listing.geographic_area,
                Utc::now(),
            ],
        )?;

        Ok(inserted > 0)
    }

    /// Store a comparables record
    pub fn insert_comparable(&self, comparable: &ComparableRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO hemnet_comp_items (
                uuid, hemnet_id, salda_id, url, latitude, longitude, city, postal_city,
                district, country, region, municipality, street, location, main_location,
                street_address, offers_selling_price, new_production, upcoming_open_houses,
                home_swapping, has_price_change, has_active_toplisting, living_area, rooms,
                broker_firm, status, price, monthly_fee, cost_per_year, publication_date,
                images_count, item_type, price_per_m2, collected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
                      ?31, ?32, ?33, ?34)",
            params![
                Uuid::new_v4().to_string(),
                comparable.hemnet_id,
                comparable.salda_id,
                &comparable.url,
                comparable.latitude,
                comparable.longitude,
                &comparable.city,
                &comparable.postal_city,
                &comparable.district,
                &comparable.country,
                &comparable.region,
                &comparable.municipality,
                &comparable.street,
                &comparable.location,
                &comparable.main_location,
                &comparable.street_address,
                comparable.offers_selling_price,
                comparable.new_production,
                comparable.upcoming_open_houses,
                comparable.home_swapping,
                comparable.has_price_change,
                comparable.has_active_toplisting,
                comparable.living_area,
                comparable.rooms,
                &comparable.broker_firm,
                &comparable.status,
                comparable.price,
                comparable.monthly_fee,
                comparable.cost_per_year,
                comparable.publication_date,
                comparable.images_count,
                &comparable.item_type,
                comparable.price_per_m2,
                Utc::now(),
            ],
        )?;

        Ok(())
    }

    /// Identifiers of all stored listings
    pub fn known_listing_ids(&self) -> Result<HashSet<i64>> {
        let mut stmt = self.conn.prepare("SELECT hemnet_id FROM hemnet_items")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<HashSet<i64>, _>>()?;
        Ok(ids)
    }

    /// Identifier and URL of all stored listings
    pub fn known_listing_refs(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT hemnet_id, url FROM hemnet_items ORDER BY hemnet_id")?;
        let refs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(refs)
    }

    /// Listing identifiers that already have comparables
    pub fn known_comparable_salda_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT salda_id FROM hemnet_comp_items")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn count_listings(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM hemnet_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn count_comparables(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM hemnet_comp_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Get a stored listing by its identifier
    pub fn get_listing(&self, hemnet_id: i64) -> Result<Option<ListingRecord>> {
        let listing = self
            .conn
            .query_row(
                "SELECT hemnet_id, url, broker_name, broker_phone, broker_email, broker_firm,
                        broker_firm_phone, sold_date, price, asked_price, price_per_square_meter,
                        price_trend_flat, price_trend_percentage, rooms, monthly_fee,
                        square_meters, cost_per_year, year, type, association, lot_size, biarea,
                        address, geographic_area
                 FROM hemnet_items WHERE hemnet_id = ?1",
                params![hemnet_id],
                listing_from_row,
            )
            .optional()?;

        Ok(listing)
    }

    /// Comparables stored for a listing
    pub fn get_comparables(&self, salda_id: i64) -> Result<Vec<ComparableRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT hemnet_id, salda_id, url, latitude, longitude, city, postal_city, district,
                    country, region, municipality, street, location, main_location,
                    street_address, offers_selling_price, new_production, upcoming_open_houses,
                    home_swapping, has_price_change, has_active_toplisting, living_area, rooms,
                    broker_firm, status, price, monthly_fee, cost_per_year, publication_date,
                    images_count, item_type, price_per_m2
             FROM hemnet_comp_items WHERE salda_id = ?1
             ORDER BY collected_at",
        )?;

        let comparables = stmt
            .query_map(params![salda_id], comparable_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(comparables)
    }
}

fn listing_from_row(row: &Row) -> rusqlite::Result<ListingRecord> {
    Ok(ListingRecord {
        hemnet_id: row.get(0)?,
        url: row.get(1)?,
        broker_name: row.get(2)?,
        broker_phone: row.get(3)?,
        broker_email: row.get(4)?,
        broker_firm: row.get(5)?,
        broker_firm_phone: row.get(6)?,
        sold_date: row.get(7)?,
        price: row.get(8)?,
        asked_price: row.get(9)?,
        price_per_square_meter: row.get(10)?,
        price_trend_flat: row.get(11)?,
        price_trend_percentage: row.get(12)?,
        rooms: row.get(13)?,
        monthly_fee: row.get(14)?,
        square_meters: row.get(15)?,
        cost_per_year: row.get(16)?,
        year: row.get(17)?,
        property_type: row.get(18)?,
        association: row.get(19)?,
        lot_size: row.get(20)?,
        biarea: row.get(21)?,
        address: row.get(22)?,
        geographic_area: row.get(23)?,
    })
}

fn comparable_from_row(row: &Row) -> rusqlite::Result<ComparableRecord> {
    Ok(ComparableRecord {
        hemnet_id: row.get(0)?,
        salda_id: row.get(1)?,
        url: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        city: row.get(5)?,
        postal_city: row.get(6)?,
        district: row.get(7)?,
        country: row.get(8)?,
        region: row.get(9)?,
        municipality: row.get(10)?,
        street: row.get(11)?,
        location: row.get(12)?,
        main_location: row.get(13)?,
        street_address: row.get(14)?,
        offers_selling_price: row.get(15)?,
        new_production: row.get(16)?,
        upcoming_open_houses: row.get(17)?,
        home_swapping: row.get(18)?,
        has_price_change: row.get(19)?,
        has_active_toplisting: row.get(20)?,
        living_area: row.get(21)?,
        rooms: row.get(22)?,
        broker_firm: row.get(23)?,
        status: row.get(24)?,
        price: row.get(25)?,
        monthly_fee: row.get(26)?,
        cost_per_year: row.get(27)?,
        publication_date: row.get(28)?,
        images_count: row.get(29)?,
        item_type: row.get(30)?,
        price_per_m2: row.get(31)?,
    })
}
