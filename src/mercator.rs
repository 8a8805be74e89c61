//! Web-Mercator tile codec.
//!
//! An independent utility for turning lon/lat coordinates into Mercator
//! tile coordinates, packing a tile pair into a single integer geocode, and
//! estimating distances between geocodes.

/// Half the Earth's meridian circumference over pi, in metres.
const EARTH_RADIUS_M: f64 = 6_367_000.0;

/// Default zoom for geocodes: the maximum that packs two tile coordinates
/// into a `u64`.
pub const GEOCODE_ZOOM: u32 = 32;

/// Transforms a lon/lat into its Mercator floats in `[0, 1]`.
///
/// The returned `(xtile, ytile)` can be scaled to tile indices at any zoom
/// level, up to the precision of the float.
pub fn lonlat_to_tile0(lng: f64, lat: f64) -> (f64, f64) {
    let lat = lat.to_radians();
    let xtile = (lng + 180.0) / 360.0;
    let ytile = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0;
    (xtile, ytile)
}

/// Transforms a lon/lat to Mercator x/y tile indices at `zoom`.
pub fn lonlat_to_tile(lng: f64, lat: f64, zoom: u32) -> (u64, u64) {
    let (xtile, ytile) = lonlat_to_tile0(lng, lat);
    let n = (1u64 << zoom) as f64;
    ((xtile * n) as u64, (ytile * n) as u64)
}

/// Returns the lon/lat corresponding to a Mercator tile.
///
/// With `center = false` the corner with minimal lon/lat is returned; with
/// `center = true` the centre of the tile is.
pub fn tile_to_lonlat(xtile: f64, ytile: f64, zoom: u32, center: bool) -> (f64, f64) {
    let (xtile, ytile) = if center {
        (xtile + 0.5, ytile + 0.5)
    } else {
        (xtile, ytile)
    };
    let n = (1u64 << zoom) as f64;
    let lon_deg = xtile / n * 360.0 - 180.0;
    let lat_rad = (std::f64::consts::PI * (1.0 - 2.0 * ytile / n)).sinh().atan();
    (lon_deg, lat_rad.to_degrees())
}

/// Encodes a lon/lat into a single integer geocode at zoom `z`.
///
/// The x and y tile indices are padded together; `z` must be at most
/// [`GEOCODE_ZOOM`] for the result to fit a `u64`.
pub fn encode(lng: f64, lat: f64, z: u32) -> u64 {
    let (x, y) = lonlat_to_tile(lng, lat, z);
    x * (1u64 << z) + y
}

/// Decodes a geocode back to an approximate lon/lat.
///
/// `z` must match the zoom used with [`encode`]. With `center = true` the
/// centre of the encoded tile is returned.
pub fn decode(geocode: u64, z: u32, center: bool) -> (f64, f64) {
    let n = 1u64 << z;
    let x = geocode / n;
    let y = geocode % n;
    tile_to_lonlat(x as f64, y as f64, z, center)
}

/// Great-circle distance in metres between two `(lon, lat)` points in
/// decimal degrees.
pub fn haversine(lonlat1: (f64, f64), lonlat2: (f64, f64)) -> f64 {
    let (lon1, lat1) = (lonlat1.0.to_radians(), lonlat1.1.to_radians());
    let (lon2, lat2) = (lonlat2.0.to_radians(), lonlat2.1.to_radians());
    let dlon = lon2 - lon1;
    let dlat = lat2 - lat1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().asin() * EARTH_RADIUS_M
}

/// Conservative distance in metres between two geocodes at zoom `z`.
///
/// Measures between the facing corners of the two tiles, so neighbouring
/// tiles are at distance zero and the result never exceeds the true
/// distance between points inside them.
pub fn distance_codes(code1: u64, code2: u64, z: u32) -> f64 {
    let n = 1u64 << z;
    let (x1, y1) = ((code1 / n) as i64, (code1 % n) as i64);
    let (x2, y2) = ((code2 / n) as i64, (code2 % n) as i64);
    let dx = (x1 - x2).signum();
    let dy = (y1 - y2).signum();
    let (lon1, lat1) = tile_to_lonlat((x1 - dx.min(0)) as f64, (y1 - dy.max(0)) as f64, z, false);
    let (lon2, lat2) = tile_to_lonlat((x2 + dx.max(0)) as f64, (y2 + dy.min(0)) as f64, z, false);
    haversine((lon1, lat1), (lon2, lat2))
}
