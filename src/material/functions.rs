//! GLSL helper functions spliced into stages on demand via `add_function`.
//!
//! Each constant is registered under the text preceding its first `(`, so a
//! helper used by several nodes is emitted once per stage.

pub const TEX_CHECKER: &str = "
vec3 tex_checker(const vec3 co, const vec3 col1, const vec3 col2, const float scale) {
    vec3 p = (co + 0.000001 * 0.999999) * scale;
    float xi = abs(floor(p.x));
    float yi = abs(floor(p.y));
    float zi = abs(floor(p.z));
    bool check = ((mod(xi, 2.0) == mod(yi, 2.0)) == bool(mod(zi, 2.0)));
    return check ? col1 : col2;
}
float tex_checker_f(const vec3 co, const float scale) {
    vec3 p = (co + 0.000001 * 0.999999) * scale;
    float xi = abs(floor(p.x));
    float yi = abs(floor(p.y));
    float zi = abs(floor(p.z));
    return float((mod(xi, 2.0) == mod(yi, 2.0)) == bool(mod(zi, 2.0)));
}
";

pub const HUE_SAT: &str = "
vec3 hsv_to_rgb(const vec3 c) {
    const vec4 K = vec4(1.0, 2.0 / 3.0, 1.0 / 3.0, 3.0);
    vec3 p = abs(fract(c.xxx + K.xyz) * 6.0 - K.www);
    return c.z * mix(K.xxx, clamp(p - K.xxx, 0.0, 1.0), c.y);
}
vec3 rgb_to_hsv(const vec3 c) {
    const vec4 K = vec4(0.0, -1.0 / 3.0, 2.0 / 3.0, -1.0);
    vec4 p = mix(vec4(c.bg, K.wz), vec4(c.gb, K.xy), step(c.b, c.g));
    vec4 q = mix(vec4(p.xyw, c.r), vec4(c.r, p.yzx), step(p.x, c.r));
    float d = q.x - min(q.w, q.y);
    float e = 1.0e-10;
    return vec3(abs(q.z + (q.w - q.y) / (6.0 * d + e)), d / (q.x + e), q.x);
}
vec3 hue_sat(const vec3 col, const vec4 shift) {
    vec3 hsv = rgb_to_hsv(col);
    hsv.x += shift.x;
    hsv.y *= shift.y;
    hsv.z *= shift.z;
    return mix(hsv_to_rgb(hsv), col, shift.w);
}
";

pub const WAVELENGTH_TO_RGB: &str = "
vec3 wavelength_to_rgb(const float t) {
    vec3 r = t * 2.1 - vec3(1.8, 1.14, 0.3);
    return 1.0 - r * r;
}
";

pub const BRIGHTCONTRAST: &str = "
vec3 brightcontrast(const vec3 col, const float bright, const float contr) {
    float a = 1.0 + contr;
    float b = bright - contr * 0.5;
    return max(a * col + b, 0.0);
}
";

/// Dielectric fresnel, exact form.
pub const FRESNEL: &str = "
float fresnel(float eta, float c) {
    float g = eta * eta - 1.0 + c * c;
    if (g < 0.0) return 1.0;
    g = sqrt(g);
    float a = (g - c) / (g + c);
    float b = ((g + c) * c - 1.0) / ((g - c) * c + 1.0);
    return 0.5 * a * a * (1.0 + b * b);
}
";

pub const SAFE_DIVIDE: &str = "
vec3 safe_divide(const vec3 a, const vec3 b) {
\treturn vec3((b.x != 0.0) ? a.x / b.x : 0.0,
\t            (b.y != 0.0) ? a.y / b.y : 0.0,
\t            (b.z != 0.0) ? a.z / b.z : 0.0);
}
";

pub const PROJECT: &str = "
vec3 project(const vec3 v, const vec3 v_proj) {
\tfloat lenSquared = dot(v_proj, v_proj);
\treturn (lenSquared != 0.0) ? (dot(v, v_proj) / lenSquared) * v_proj : vec3(0);
}
";

pub const WRAP: &str = "
float wrap(const float value, const float max, const float min) {
\tfloat range = max - min;
\treturn (range != 0.0) ? value - (range * floor((value - min) / range)) : min;
}
vec3 wrap(const vec3 value, const vec3 max, const vec3 min) {
\treturn vec3(wrap(value.x, max.x, min.x),
\t            wrap(value.y, max.y, min.y),
\t            wrap(value.z, max.z, min.z));
}
";

pub const MAP_RANGE_LINEAR: &str = "
float map_range_linear(const float value, const float fromMin, const float fromMax, const float toMin, const float toMax) {
  if (fromMax != fromMin) {
    return float(toMin + ((value - fromMin) / (fromMax - fromMin)) * (toMax - toMin));
  }
  else {
    return float(0.0);
  }
}
";

/// Piecewise fit of the Planckian locus, in kelvin.
pub const BLACKBODY: &str = "
vec3 blackbody(const float temperature) {
  if (temperature >= 12000.0) return vec3(0.826270103, 0.994478524, 1.56626022);
  if (temperature < 965.0) return vec3(4.70366907, 0.0, 0.0);
  float t_inv = float(1.0 / temperature);
  vec3 r; vec3 g; vec4 b;
  if (temperature >= 6365.0) {
    r = vec3(3.78765709e+03, 9.36026367e-06, 3.98995841e-01);
    g = vec3(-5.00279505e+02, -4.59745390e-06, 1.09090465e+00);
    b = vec4(6.72595954e-13, -2.73059993e-08, 4.24068546e-04, -7.52204323e-01);
  } else if (temperature >= 3315.0) {
    r = vec3(4.60124770e+03, 2.89727618e-05, 1.48001316e-01);
    g = vec3(-1.18134453e+03, -2.18913373e-05, 1.30656109e+00);
    b = vec4(-2.22463426e-13, -1.55078698e-08, 3.81675160e-04, -7.30646033e-01);
  } else if (temperature >= 1902.0) {
    r = vec3(4.66849800e+03, 2.85655028e-05, 1.29075375e-01);
    g = vec3(-1.42546105e+03, -4.01730887e-05, 1.44002695e+00);
    b = vec4(-2.02524603e-11, 1.79435860e-07, -2.60561875e-04, -1.41761141e-02);
  } else if (temperature >= 1449.0) {
    r = vec3(4.10671449e+03, -8.61949938e-05, 6.41423749e-01);
    g = vec3(-1.22075471e+03, 2.56245413e-05, 1.20753416e+00);
    b = vec4(0.0);
  } else if (temperature >= 1167.0) {
    r = vec3(3.37763626e+03, -4.34581697e-04, 1.64843306e+00);
    g = vec3(-1.00402363e+03, 1.29189794e-04, 9.08181524e-01);
    b = vec4(0.0);
  } else {
    r = vec3(2.52432244e+03, -1.06185848e-03, 3.11067539e+00);
    g = vec3(-7.50343014e+02, 3.15679613e-04, 4.73464526e-01);
    b = vec4(0.0);
  }
  return vec3(r.r * t_inv + r.g * temperature + r.b,
              g.r * t_inv + g.g * temperature + g.b,
              ((b.r * temperature + b.g) * temperature + b.b) * temperature + b.a);
}
";

pub const MAP_RANGE_STEPPED: &str = "
float map_range_stepped(const float value, const float fromMin, const float fromMax, const float toMin, const float toMax, const float steps) {
  if (fromMax != fromMin) {
    float factor = (value - fromMin) / (fromMax - fromMin);
    factor = (steps > 0.0) ? floor(factor * (steps + 1.0)) / steps : 0.0;
    return float(toMin + factor * (toMax - toMin));
  }
  else {
    return float(0.0);
  }
}
";

pub const MAP_RANGE_SMOOTHSTEP: &str = "
float map_range_smoothstep(const float value, const float fromMin, const float fromMax, const float toMin, const float toMax) {
  if (fromMax != fromMin) {
    float factor = (fromMin > fromMax) ? 1.0 - smoothstep(fromMax, fromMin, value) :
                                         smoothstep(fromMin, fromMax, value);
    return float(toMin + factor * (toMax - toMin));
  }
  else {
    return float(0.0);
  }
}
";

/// Carries its own scalar `safe_divide` and `smootherstep`.
pub const MAP_RANGE_SMOOTHERSTEP: &str = "
float safe_divide(float a, float b) {
  return (b != 0.0) ? a / b : 0.0;
}
float smootherstep(float edge0, float edge1, float x) {
  x = clamp(safe_divide((x - edge0), (edge1 - edge0)), 0.0, 1.0);
  return x * x * x * (x * (x * 6.0 - 15.0) + 10.0);
}
float map_range_smootherstep(const float value, const float fromMin, const float fromMax, const float toMin, const float toMax) {
  if (fromMax != fromMin) {
    float factor = (fromMin > fromMax) ? 1.0 - smootherstep(fromMax, fromMin, value) :
                                         smootherstep(fromMin, fromMax, value);
    return float(toMin + factor * (toMax - toMin));
  }
  else {
    return float(0.0);
  }
}
";
