mod damage;
mod scenarios;
